//! Best-effort message mirroring.
//!
//! Every user and assistant message is posted to the backend on a detached
//! task. Failures are logged and dropped; the conversation never waits on
//! them.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

use raon_core::types::{RestoredMessage, Role, Timestamp};
use raon_storage::SessionStore;

use crate::backend::{Backend, MessageSaveRequest};

#[derive(Clone)]
pub struct PersistenceBridge {
    backend: Arc<dyn Backend>,
    store: Arc<dyn SessionStore>,
    runtime: Option<Handle>,
}

impl PersistenceBridge {
    /// Captures the current tokio runtime, if any, so saves can be spawned
    /// from SDK callback threads.
    pub fn new(backend: Arc<dyn Backend>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            backend,
            store,
            runtime: Handle::try_current().ok(),
        }
    }

    pub fn save_user_message(&self, session_id: &str, text: &str) -> Option<JoinHandle<()>> {
        self.save(session_id, Role::User, text)
    }

    pub fn save_assistant_message(&self, session_id: &str, text: &str) -> Option<JoinHandle<()>> {
        self.save(session_id, Role::Ai, text)
    }

    fn save(&self, session_id: &str, role: Role, text: &str) -> Option<JoinHandle<()>> {
        let cached = RestoredMessage {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.to_string(),
            timestamp: Timestamp::now().0,
        };
        if let Err(e) = self.store.append_cached_message(session_id, &cached) {
            tracing::warn!(session_id, error = %e, "Failed to cache message locally");
        }

        let backend = self.backend.clone();
        let session_id = session_id.to_string();
        let request = MessageSaveRequest::new(role, text);
        spawn_detached(self.runtime.as_ref(), async move {
            match backend.save_message(&session_id, &request).await {
                Ok(()) => tracing::debug!(%session_id, role = %request.role, "Message persisted"),
                Err(e) => tracing::warn!(
                    %session_id,
                    role = %request.role,
                    error = %e,
                    "Failed to persist message"
                ),
            }
        })
    }
}

/// Spawn on the current runtime, falling back to `runtime` when called
/// from a thread outside tokio.
pub(crate) fn spawn_detached<F>(runtime: Option<&Handle>, future: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current().ok().or_else(|| runtime.cloned()) {
        Some(handle) => Some(handle.spawn(future)),
        None => {
            tracing::warn!("No tokio runtime available; dropping background task");
            None
        }
    }
}
