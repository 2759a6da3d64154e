//! Error types shared across the Sparkify workspace

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, SparkifyError>;

/// Main error type for shared operations
#[derive(Error, Debug)]
pub enum SparkifyError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// An environment value that is not of the expected type
    #[error("Parse error: {0}")]
    Parse(String),
}

impl SparkifyError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
