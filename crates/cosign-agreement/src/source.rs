use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use cosign_core::error::{CosignError, Result};
use cosign_core::event::BroadcastHub;

/// A subscription to the real-time approval channel.
///
/// `None` means the channel closed; `Some(Err(_))` means it failed.
/// Implementations must be cancel-safe: the listener drops a pending
/// `next_frame` future when its deadline fires.
pub trait ApprovalSource: Send {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<String>>>;
}

/// Subscription to the in-process broadcast hub.
pub struct HubSource {
    rx: broadcast::Receiver<String>,
}

impl HubSource {
    pub fn new(hub: &BroadcastHub) -> Self {
        Self { rx: hub.subscribe() }
    }
}

impl ApprovalSource for HubSource {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<String>>> {
        Box::pin(async move {
            loop {
                match self.rx.recv().await {
                    Ok(frame) => return Some(Ok(frame)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Approval listener lagged behind the hub");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }
}

/// Subscription to a remote `/ws` endpoint.
pub struct WebSocketSource {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketSource {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| CosignError::Channel(format!("connect {}: {}", url, e)))?;
        info!(url, "Approval channel connected");
        Ok(Self { stream })
    }
}

impl ApprovalSource for WebSocketSource {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<String>>> {
        Box::pin(async move {
            loop {
                let msg = match self.stream.next().await {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => return Some(Err(CosignError::Channel(e.to_string()))),
                    None => return None,
                };
                match msg {
                    WsMessage::Text(text) => return Some(Ok(text.to_string())),
                    WsMessage::Binary(data) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => return Some(Ok(text)),
                        Err(_) => {
                            debug!("Ignoring non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    WsMessage::Ping(data) => {
                        if let Err(e) = self.stream.send(WsMessage::Pong(data)).await {
                            return Some(Err(CosignError::Channel(e.to_string())));
                        }
                    }
                    WsMessage::Close(_) => return None,
                    _ => continue,
                }
            }
        })
    }
}

/// Frames pushed through an mpsc channel (embedding and tests).
impl ApprovalSource for mpsc::Receiver<Result<String>> {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<String>>> {
        Box::pin(self.recv())
    }
}

/// How a lifecycle run obtains its approval subscription.
#[derive(Clone)]
pub enum ApprovalFeed {
    Local(Arc<BroadcastHub>),
    Remote { url: String },
}

impl ApprovalFeed {
    /// Open a fresh, independent subscription.
    pub async fn open(&self) -> Result<Box<dyn ApprovalSource>> {
        match self {
            Self::Local(hub) => Ok(Box::new(HubSource::new(hub))),
            Self::Remote { url } => Ok(Box::new(WebSocketSource::connect(url).await?)),
        }
    }
}
