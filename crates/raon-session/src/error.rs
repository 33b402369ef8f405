//! Error types for the session core.

use raon_core::error::RaonError;

use crate::sdk::SdkError;

/// Why a session config cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required session config fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("unknown {kind} selection: {id}")]
    UnknownSelection { kind: &'static str, id: String },
    #[error("no persisted session config")]
    NotPersisted,
    #[error("failed to access session store: {0}")]
    Store(String),
}

/// Errors talking to the backend REST API.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Errors from the session lifecycle controller.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session config: {0}")]
    Config(#[from] ConfigError),
    #[error("session creation failed: {0}")]
    Creation(String),
    #[error("a session is already being created")]
    AlreadyCreating,
    #[error("no active session")]
    NotActive,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("avatar SDK error: {0}")]
    Sdk(#[from] SdkError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("session controller is shut down")]
    ShutDown,
}

impl From<RaonError> for SessionError {
    fn from(err: RaonError) -> Self {
        SessionError::Storage(err.to_string())
    }
}

impl From<SessionError> for RaonError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Config(e) => RaonError::Config(e.to_string()),
            SessionError::Backend(e) => RaonError::Backend(e.to_string()),
            SessionError::Sdk(e) => RaonError::Sdk(e.to_string()),
            SessionError::Storage(msg) => RaonError::Storage(msg),
            SessionError::ShutDown => RaonError::ShuttingDown,
            other => RaonError::Session(other.to_string()),
        }
    }
}
