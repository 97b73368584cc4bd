//! Mocks and fixtures shared by the cosign test suites.

pub mod fixtures;
mod generator;
mod notifier;
mod store;

pub use generator::ScriptedGenerator;
pub use notifier::RecordingNotifier;
pub use store::MemoryStore;
