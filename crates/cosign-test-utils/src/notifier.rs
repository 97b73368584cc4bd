use std::sync::Mutex;

use futures::future::BoxFuture;
use tokio::sync::Notify;

use cosign_core::error::Result;
use cosign_core::traits::Notifier;
use cosign_core::types::Delivery;

/// Notifier that keeps every delivery in memory.
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<Delivery>>,
    /// Recipient whose delivery is refused; `Some("")` refuses everyone.
    refuse: Option<String>,
    delivered: Notify,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            refuse: None,
            delivered: Notify::new(),
        }
    }

    /// Refuses every delivery.
    pub fn refusing() -> Self {
        Self {
            refuse: Some(String::new()),
            ..Self::new()
        }
    }

    /// Refuses deliveries to `email` only.
    pub fn refusing_for(email: &str) -> Self {
        Self {
            refuse: Some(email.to_string()),
            ..Self::new()
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Resolve once at least `n` deliveries were accepted.
    pub async fn wait_for(&self, n: usize) {
        loop {
            let notified = self.delivered.notified();
            if self.deliveries.lock().unwrap().len() >= n {
                return;
            }
            notified.await;
        }
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, delivery: &Delivery) -> BoxFuture<'_, Result<bool>> {
        let delivery = delivery.clone();
        Box::pin(async move {
            let refused = match &self.refuse {
                Some(email) => email.is_empty() || *email == delivery.email,
                None => false,
            };
            if refused {
                return Ok(false);
            }
            self.deliveries.lock().unwrap().push(delivery);
            self.delivered.notify_waiters();
            Ok(true)
        })
    }
}
