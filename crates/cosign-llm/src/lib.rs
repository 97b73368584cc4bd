pub mod chat;
pub mod prompts;

pub use chat::ChatGenerator;
