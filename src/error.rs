use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {message}")]
    Request { status: StatusCode, message: String },

    #[error("Session expired or invalid token")]
    AuthExpired,

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Session storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Session storage migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl AppError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AppError::Request { status, .. } => Some(*status),
            AppError::AuthExpired => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }
}
