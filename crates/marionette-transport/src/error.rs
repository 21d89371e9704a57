//! Transport errors

use marionette_core::MarionetteError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Session closed")]
    Closed,

    #[error("Host rejected request ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Protocol(e.to_string())
    }
}

impl From<TransportError> for MarionetteError {
    fn from(e: TransportError) -> Self {
        MarionetteError::Transport(e.to_string())
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
