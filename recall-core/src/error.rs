//! Error types for recall-core.

use thiserror::Error;

use crate::config::ConfigValidationError;

/// Result type alias using recall-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for recall operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    // External collaborator errors
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {cmd}\n{stderr}")]
    CommandFailed { cmd: String, stderr: String },

    #[error("Keyword extraction failed: {0}")]
    Extraction(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    // Feedback errors
    #[error("Invalid feedback: {0}")]
    InvalidFeedback(String),
}

impl Error {
    /// Create an error from a command failure
    pub fn command_failed(cmd: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            cmd: cmd.into(),
            stderr: stderr.into(),
        }
    }
}
