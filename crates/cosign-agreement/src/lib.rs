pub mod generation;
pub mod lifecycle;
pub mod listener;
pub mod pool;
pub mod record;
pub mod registry;
pub mod render;
pub mod source;
pub mod uploads;

pub use generation::GenerationOrchestrator;
pub use lifecycle::{AgreementRequest, LifecycleCoordinator, LifecycleReport};
pub use listener::ApprovalListener;
pub use pool::WorkerPool;
pub use record::{AgreementForm, AgreementRecord, Party, VoteEffect};
pub use registry::{SharedRecord, StateRegistry};
pub use source::{ApprovalFeed, ApprovalSource, HubSource, WebSocketSource};
pub use uploads::{IdentityUpload, IdentityUploads};
