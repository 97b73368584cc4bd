use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use cosign_core::event::BroadcastHub;

/// Forward every hub frame to one WebSocket client until either side closes.
///
/// The socket is read-only: client text is dropped. Votes arrive through the
/// sign links, which check the party id.
pub async fn handle_connection(ws: WebSocket, hub: &BroadcastHub) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut frames = hub.subscribe();

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket client lagged behind hub");
                }
                Err(RecvError::Closed) => break,
            },
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket read error");
                        break;
                    }
                    None => break,
                };
                match msg {
                    Message::Text(_) => debug!("Ignoring client frame on read-only socket"),
                    Message::Ping(data) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    debug!("Connection closed");
}
