//! Database schema migrations.
//!
//! Applies the session_state key/value table and the per-session
//! message_cache table, tracked in schema_migrations.

use rusqlite::Connection;
use tracing::info;

use raon_core::error::RaonError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), RaonError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| RaonError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| RaonError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: session_state");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), RaonError> {
    conn.execute_batch(
        "
        -- Single-value slots (config snapshot, session id, chat room id).
        CREATE TABLE IF NOT EXISTS session_state (
            key         TEXT PRIMARY KEY NOT NULL,
            value       TEXT NOT NULL,
            updated_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        -- Messages mirrored per streaming session.
        CREATE TABLE IF NOT EXISTS message_cache (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL,
            message_id  TEXT NOT NULL,
            role        TEXT NOT NULL CHECK (role IN ('user', 'ai')),
            text        TEXT NOT NULL,
            timestamp   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_message_cache_session
            ON message_cache (session_id, seq ASC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'session_state');
        ",
    )
    .map_err(|e| RaonError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_once() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_message_cache_role_check() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO message_cache (session_id, message_id, role, text, timestamp)
             VALUES ('s', '1', 'system', 'x', 0)",
            [],
        );
        assert!(result.is_err());
    }
}
