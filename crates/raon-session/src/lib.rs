//! Raon Session crate - the streaming avatar session core.
//!
//! Wires the backend REST API and the avatar SDK into one lifecycle:
//! `resolver` validates the session config, `controller` creates, closes,
//! and reconnects the streaming session, `reconciler` merges restored
//! history with the live chat log, and `persistence` mirrors messages to
//! the backend without blocking the conversation.

pub mod backend;
pub mod controller;
pub mod error;
pub mod http;
pub mod persistence;
pub mod reconciler;
pub mod resolver;
pub mod sdk;

pub use backend::{
    Backend, ConfigurationBundle, CreateSessionRequest, CreatedSession, Credentials,
    MessageSaveRequest, StoredMessage,
};
pub use controller::SessionController;
pub use error::{BackendError, ConfigError, SessionError};
pub use http::HttpBackend;
pub use persistence::PersistenceBridge;
pub use reconciler::{ChatLogReconciler, Reconciliation};
pub use resolver::{ConfigResolver, ConfigSource};
pub use sdk::{AvatarSdk, AvatarSession, SdkError, Subscription, VideoSink};
