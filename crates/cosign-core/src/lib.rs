pub mod config;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{CosignError, Result};
pub use event::BroadcastHub;
pub use types::*;
