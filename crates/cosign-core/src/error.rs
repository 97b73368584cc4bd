use thiserror::Error;

#[derive(Debug, Error)]
pub enum CosignError {
    // Generation errors
    #[error("Agreement generation failed after {attempts} attempts: {message}")]
    Generation { attempts: u32, message: String },

    #[error("Generator error: {0}")]
    Generator(String),

    #[error("Render error: {0}")]
    Render(String),

    // Dispatch errors
    #[error("Failed to deliver agreement to {recipient}")]
    Dispatch { recipient: String },

    #[error("Mail transport error: {0}")]
    Mail(String),

    // Lifecycle errors
    #[error("Agreement {0} already has a lifecycle in progress")]
    AlreadyRunning(String),

    #[error("Invalid agreement request: {0}")]
    InvalidRequest(String),

    #[error("Worker pool closed")]
    PoolClosed,

    // Upload errors
    #[error("Unknown party: {0}")]
    UnknownParty(String),

    #[error("Invalid image payload: {0}")]
    InvalidImage(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // Approval channel errors
    #[error("Approval channel error: {0}")]
    Channel(String),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CosignError>;
