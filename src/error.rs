//! Error types and handling.

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Request could not be turned into a wire command
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// TCP connection, write or read failed
    #[error("Terminal connection failed: {0}")]
    TerminalConnectionFailed(String),

    /// Terminal did not answer before the deadline
    #[error("Terminal timeout: {0}")]
    TerminalTimeout(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias for AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Create an encoding error with message
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Create a config error with message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short name of the error kind, used by the shell when reporting failures.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Encoding(_) => "EncodingError",
            Self::TerminalConnectionFailed(_) => "TransportError",
            Self::TerminalTimeout(_) => "TimeoutError",
            Self::Config(_) => "ConfigError",
        }
    }
}
