//! Raon Storage crate - persisted client-side session state.
//!
//! Holds what survives a reload: the last resolved session config, the
//! current session id, the chat room id used for context continuity, and a
//! per-session message cache. `SessionStore` is the seam the session
//! controller depends on; `MemorySessionStore` backs tests and
//! `SqliteSessionStore` backs the binary.

pub mod db;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod store;

pub use db::Database;
pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;
pub use store::SessionStore;
