use serde::Serialize;

/// Real-time fan-out hub using a tokio broadcast channel of JSON text frames.
/// Every subscriber (WebSocket clients, approval listeners) receives every frame.
pub struct BroadcastHub {
    tx: tokio::sync::broadcast::Sender<String>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a raw text frame. Returns the number of subscribers reached.
    pub fn publish(&self, frame: impl Into<String>) -> usize {
        // No receivers is not an error: nobody is listening yet
        self.tx.send(frame.into()).unwrap_or(0)
    }

    /// Serialize `value` as JSON and publish it.
    pub fn publish_json<T: Serialize>(&self, value: &T) -> usize {
        match serde_json::to_string(value) {
            Ok(frame) => self.publish(frame),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping unserializable hub frame");
                0
            }
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}
