use futures::future::BoxFuture;
use tracing::info;

use cosign_core::error::Result;
use cosign_core::traits::Notifier;
use cosign_core::types::Delivery;

/// Dispatcher used when no mail transport is configured. Logs and accepts.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, delivery: &Delivery) -> BoxFuture<'_, Result<bool>> {
        info!(
            agreement_id = %delivery.agreement_id,
            party_id = %delivery.party_id,
            recipient = %delivery.email,
            role = %delivery.role_label,
            document = %delivery.document_path.display(),
            is_final = delivery.is_final,
            "Mail not configured; delivery logged only"
        );
        Box::pin(async { Ok(true) })
    }
}
