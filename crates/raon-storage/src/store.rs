//! The persisted-state seam injected into the session controller.

use raon_core::error::RaonError;
use raon_core::types::{RestoredMessage, SessionConfig};

/// Client-side persisted session state.
///
/// Each slot has get/set/clear operations. Implementations must be cheap
/// and synchronous; callers never hold them across an `.await`.
pub trait SessionStore: Send + Sync {
    /// Last successfully resolved session config.
    fn load_config(&self) -> Result<Option<SessionConfig>, RaonError>;
    fn save_config(&self, config: &SessionConfig) -> Result<(), RaonError>;
    fn clear_config(&self) -> Result<(), RaonError>;

    /// Id of the streaming session currently in use.
    fn session_id(&self) -> Result<Option<String>, RaonError>;
    fn set_session_id(&self, session_id: &str) -> Result<(), RaonError>;
    fn clear_session_id(&self) -> Result<(), RaonError>;

    /// Chat room the backend groups sessions under. Survives manual close so
    /// a later session can ask for context continuity.
    fn chat_room_id(&self) -> Result<Option<i64>, RaonError>;
    fn set_chat_room_id(&self, chat_room_id: i64) -> Result<(), RaonError>;
    fn clear_chat_room_id(&self) -> Result<(), RaonError>;

    /// Messages mirrored for one session, in insertion order.
    fn cached_messages(&self, session_id: &str) -> Result<Vec<RestoredMessage>, RaonError>;
    fn append_cached_message(
        &self,
        session_id: &str,
        message: &RestoredMessage,
    ) -> Result<(), RaonError>;
    fn clear_cached_messages(&self, session_id: &str) -> Result<(), RaonError>;
}
