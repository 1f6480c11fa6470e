//! Error types for the Quillgate service.

use thiserror::Error;

/// Main error type for Quillgate operations.
#[derive(Error, Debug)]
pub enum QuillgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A throttle policy with a zero limit or window, or an unparseable policy file
    #[error("Invalid throttle policy: {0}")]
    Policy(String),

    /// A route or request named a policy the table does not define
    #[error("Unknown throttle policy: {0}")]
    UnknownPolicy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for QuillgateError {
    fn from(err: config::ConfigError) -> Self {
        QuillgateError::Config(err.to_string())
    }
}

/// Result type alias for Quillgate operations.
pub type Result<T> = std::result::Result<T, QuillgateError>;
