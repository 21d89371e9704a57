//! Error types for the avatar controller

use thiserror::Error;

/// Core controller errors
#[derive(Error, Debug)]
pub enum MarionetteError {
    // Connection errors
    #[error("No connection tier reachable after {attempts} attempts")]
    TransportUnavailable { attempts: u32 },

    #[error("Dispatch failed: {0}")]
    DispatchFailure(String),

    #[error("Reconnect budget exhausted after {0} attempts")]
    ReconnectExhausted(u32),

    // Expression errors
    #[error("Unknown emotion: {0}")]
    UnknownEmotion(String),

    #[error("Unmapped parameter: {0}")]
    UnmappedParameter(String),

    #[error("Unknown background behavior: {0}")]
    UnknownBehavior(String),

    #[error("Unknown trigger: {0}")]
    UnknownTrigger(String),

    // Lifecycle errors
    #[error("Controller is not running")]
    NotRunning,

    #[error("Controller has been shut down")]
    AlreadyShutDown,

    // Collaborator errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl MarionetteError {
    /// Recoverable errors are logged and absorbed; the tick loop keeps running.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MarionetteError::DispatchFailure(_)
                | MarionetteError::UnknownEmotion(_)
                | MarionetteError::UnmappedParameter(_)
                | MarionetteError::UnknownBehavior(_)
                | MarionetteError::UnknownTrigger(_)
                | MarionetteError::ReconnectExhausted(_)
        )
    }
}

/// Result type for controller operations
pub type MarionetteResult<T> = Result<T, MarionetteError>;
