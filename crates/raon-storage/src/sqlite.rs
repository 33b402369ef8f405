//! SQLite-backed `SessionStore` so session continuity survives a restart.

use std::sync::Arc;

use raon_core::error::RaonError;
use raon_core::types::{RestoredMessage, Role, SessionConfig};

use crate::db::{storage_err, Database};
use crate::store::SessionStore;

const KEY_CONFIG: &str = "session_config";
const KEY_SESSION_ID: &str = "session_id";
const KEY_CHAT_ROOM_ID: &str = "chat_room_id";

/// Session store persisting slots in `session_state` and mirrored messages
/// in `message_cache`.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    db: Arc<Database>,
}

impl SqliteSessionStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn get(&self, key: &str) -> Result<Option<String>, RaonError> {
        self.db.read_slot(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RaonError> {
        self.db.write_slot(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), RaonError> {
        self.db.clear_slot(key)
    }
}

fn role_column(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Ai => "ai",
    }
}

impl SessionStore for SqliteSessionStore {
    fn load_config(&self) -> Result<Option<SessionConfig>, RaonError> {
        match self.get(KEY_CONFIG)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_config(&self, config: &SessionConfig) -> Result<(), RaonError> {
        let json = serde_json::to_string(config)?;
        self.set(KEY_CONFIG, &json)
    }

    fn clear_config(&self) -> Result<(), RaonError> {
        self.remove(KEY_CONFIG)
    }

    fn session_id(&self) -> Result<Option<String>, RaonError> {
        self.get(KEY_SESSION_ID)
    }

    fn set_session_id(&self, session_id: &str) -> Result<(), RaonError> {
        self.set(KEY_SESSION_ID, session_id)
    }

    fn clear_session_id(&self) -> Result<(), RaonError> {
        self.remove(KEY_SESSION_ID)
    }

    fn chat_room_id(&self) -> Result<Option<i64>, RaonError> {
        match self.get(KEY_CHAT_ROOM_ID)? {
            Some(raw) => raw.parse::<i64>().map(Some).map_err(|e| {
                RaonError::Storage(format!("Corrupt chat room id {:?}: {}", raw, e))
            }),
            None => Ok(None),
        }
    }

    fn set_chat_room_id(&self, chat_room_id: i64) -> Result<(), RaonError> {
        self.set(KEY_CHAT_ROOM_ID, &chat_room_id.to_string())
    }

    fn clear_chat_room_id(&self) -> Result<(), RaonError> {
        self.remove(KEY_CHAT_ROOM_ID)
    }

    fn cached_messages(&self, session_id: &str) -> Result<Vec<RestoredMessage>, RaonError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT message_id, role, text, timestamp
                     FROM message_cache
                     WHERE session_id = ?1
                     ORDER BY seq ASC",
                )
                .map_err(storage_err("prepare message cache query"))?;

            let rows = stmt
                .query_map(rusqlite::params![session_id], |row| {
                    let role: String = row.get(1)?;
                    Ok(RestoredMessage {
                        id: row.get(0)?,
                        role: Role::from_backend(&role),
                        text: row.get(2)?,
                        timestamp: row.get(3)?,
                    })
                })
                .map_err(storage_err("read message cache"))?;

            rows.collect::<Result<Vec<_>, _>>()
                .map_err(storage_err("read message cache"))
        })
    }

    fn append_cached_message(
        &self,
        session_id: &str,
        message: &RestoredMessage,
    ) -> Result<(), RaonError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO message_cache (session_id, message_id, role, text, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    session_id,
                    message.id,
                    role_column(message.role),
                    message.text,
                    message.timestamp,
                ],
            )
            .map_err(storage_err("cache message"))?;
            Ok(())
        })
    }

    fn clear_cached_messages(&self, session_id: &str) -> Result<(), RaonError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM message_cache WHERE session_id = ?1",
                rusqlite::params![session_id],
            )
            .map_err(storage_err("clear message cache"))?;
            Ok(())
        })
    }
}
