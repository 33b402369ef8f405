//! In-memory `SessionStore`, the equivalent of tab-scoped session storage.

use std::collections::HashMap;
use std::sync::Mutex;

use raon_core::error::RaonError;
use raon_core::types::{RestoredMessage, SessionConfig};

use crate::store::SessionStore;

#[derive(Debug, Default)]
struct Slots {
    config: Option<SessionConfig>,
    session_id: Option<String>,
    chat_room_id: Option<i64>,
    messages: HashMap<String, Vec<RestoredMessage>>,
}

/// Thread-safe in-memory session store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slots: Mutex<Slots>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_slots<F, T>(&self, f: F) -> Result<T, RaonError>
    where
        F: FnOnce(&mut Slots) -> T,
    {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| RaonError::Storage(format!("Session store lock poisoned: {}", e)))?;
        Ok(f(&mut slots))
    }
}

impl SessionStore for MemorySessionStore {
    fn load_config(&self) -> Result<Option<SessionConfig>, RaonError> {
        self.with_slots(|s| s.config.clone())
    }

    fn save_config(&self, config: &SessionConfig) -> Result<(), RaonError> {
        self.with_slots(|s| s.config = Some(config.clone()))
    }

    fn clear_config(&self) -> Result<(), RaonError> {
        self.with_slots(|s| s.config = None)
    }

    fn session_id(&self) -> Result<Option<String>, RaonError> {
        self.with_slots(|s| s.session_id.clone())
    }

    fn set_session_id(&self, session_id: &str) -> Result<(), RaonError> {
        self.with_slots(|s| s.session_id = Some(session_id.to_string()))
    }

    fn clear_session_id(&self) -> Result<(), RaonError> {
        self.with_slots(|s| s.session_id = None)
    }

    fn chat_room_id(&self) -> Result<Option<i64>, RaonError> {
        self.with_slots(|s| s.chat_room_id)
    }

    fn set_chat_room_id(&self, chat_room_id: i64) -> Result<(), RaonError> {
        self.with_slots(|s| s.chat_room_id = Some(chat_room_id))
    }

    fn clear_chat_room_id(&self) -> Result<(), RaonError> {
        self.with_slots(|s| s.chat_room_id = None)
    }

    fn cached_messages(&self, session_id: &str) -> Result<Vec<RestoredMessage>, RaonError> {
        self.with_slots(|s| s.messages.get(session_id).cloned().unwrap_or_default())
    }

    fn append_cached_message(
        &self,
        session_id: &str,
        message: &RestoredMessage,
    ) -> Result<(), RaonError> {
        self.with_slots(|s| {
            s.messages
                .entry(session_id.to_string())
                .or_default()
                .push(message.clone())
        })
    }

    fn clear_cached_messages(&self, session_id: &str) -> Result<(), RaonError> {
        self.with_slots(|s| {
            s.messages.remove(session_id);
        })
    }
}
