//! The session state database.
//!
//! One SQLite file per data directory holding the `session_state` slots and
//! the per-session `message_cache`. The connection sits behind a `Mutex`;
//! every access goes through `with_conn` and is short enough that callers
//! never hold it across an `.await`.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};

use raon_core::error::RaonError;

use crate::migrations;

/// The `raon` CLI and a running controller may open the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Map a rusqlite failure into a storage error with what was being done.
pub(crate) fn storage_err(action: &str) -> impl FnOnce(rusqlite::Error) -> RaonError + '_ {
    move |e| RaonError::Storage(format!("Failed to {}: {}", action, e))
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the session database at `path` and migrate it.
    pub fn new(path: &Path) -> Result<Self, RaonError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(storage_err("open session database"))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(storage_err("set busy timeout"))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(storage_err("enable WAL"))?;

        let db = Self::migrated(conn)?;
        tracing::debug!(
            path = %path.display(),
            version = db.schema_version()?,
            "Session database ready"
        );
        Ok(db)
    }

    /// A throwaway database for tests and dry runs.
    pub fn in_memory() -> Result<Self, RaonError> {
        let conn = Connection::open_in_memory().map_err(storage_err("open in-memory database"))?;
        Self::migrated(conn)
    }

    fn migrated(conn: Connection) -> Result<Self, RaonError> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, RaonError>
    where
        F: FnOnce(&Connection) -> Result<T, RaonError>,
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&conn)
    }

    /// Highest applied migration.
    pub fn schema_version(&self) -> Result<i64, RaonError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .map_err(storage_err("read schema version"))
        })
    }

    // =========================================================================
    // session_state slots
    // =========================================================================

    pub fn read_slot(&self, key: &str) -> Result<Option<String>, RaonError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM session_state WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err("read session slot"))
        })
    }

    /// Insert or overwrite a slot, stamping `updated_at`.
    pub fn write_slot(&self, key: &str, value: &str) -> Result<(), RaonError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session_state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                     updated_at = strftime('%s', 'now')",
                rusqlite::params![key, value],
            )
            .map_err(storage_err("write session slot"))?;
            Ok(())
        })
    }

    /// Remove a slot. Missing slots are not an error.
    pub fn clear_slot(&self, key: &str) -> Result<(), RaonError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM session_state WHERE key = ?1",
                rusqlite::params![key],
            )
            .map_err(storage_err("clear session slot"))?;
            Ok(())
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
