pub mod log;
pub mod smtp2go;
pub mod template;

use std::sync::Arc;

use cosign_core::config::MailConfig;
use cosign_core::traits::Notifier;

pub use log::LogNotifier;
pub use smtp2go::Smtp2goNotifier;

/// Pick the dispatcher for the configured `[mail]` section.
pub fn create_notifier(config: Option<&MailConfig>) -> Arc<dyn Notifier> {
    match config {
        Some(mail) => Arc::new(Smtp2goNotifier::new(mail.clone())),
        None => Arc::new(LogNotifier),
    }
}
