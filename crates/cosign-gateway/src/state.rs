use std::sync::Arc;

use cosign_agreement::{IdentityUploads, LifecycleCoordinator};
use cosign_core::config::GatewayConfig;
use cosign_core::event::BroadcastHub;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub coordinator: Arc<LifecycleCoordinator>,
    pub uploads: IdentityUploads,
    pub hub: Arc<BroadcastHub>,
}

impl AppState {
    /// Uploads share the coordinator's registry so they land on live records.
    pub fn new(config: GatewayConfig, coordinator: Arc<LifecycleCoordinator>) -> Self {
        Self {
            config,
            uploads: IdentityUploads::new(coordinator.registry().clone()),
            hub: coordinator.hub().clone(),
            coordinator,
        }
    }
}
