use thiserror::Error;

/// Top-level error type for the Raon session core.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for RaonError` so that the `?` operator works
/// across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RaonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Avatar SDK error: {0}")]
    Sdk(String),

    #[error("Voice input error: {0}")]
    Voice(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for RaonError {
    fn from(err: toml::de::Error) -> Self {
        RaonError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for RaonError {
    fn from(err: toml::ser::Error) -> Self {
        RaonError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RaonError {
    fn from(err: serde_json::Error) -> Self {
        RaonError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Raon operations.
pub type Result<T> = std::result::Result<T, RaonError>;
