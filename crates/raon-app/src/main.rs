//! Raon application binary - composition root.
//!
//! Ties the session crates together for terminal use:
//! 1. Load configuration from TOML
//! 2. Open the session state database
//! 3. Build the HTTP backend client
//! 4. Run one subcommand (config check, history, replay, terminate, status)

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use raon_core::config::RaonConfig;
use raon_core::types::{ChatLogEntry, DisplayMessage, SessionConfig};
use raon_session::resolver::{self, ConfigResolver, ConfigSource};
use raon_session::{Backend, ChatLogReconciler, HttpBackend, StoredMessage};
use raon_storage::{Database, MemorySessionStore, SessionStore, SqliteSessionStore};

use cli::{CliArgs, Command};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

fn open_store(data_dir: &Path) -> AppResult<Arc<SqliteSessionStore>> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("raon.db");
    let db = Database::new(&db_path)?;
    tracing::debug!(path = %db_path.display(), "Session database opened");
    Ok(Arc::new(SqliteSessionStore::new(Arc::new(db))))
}

fn print_messages(messages: &[DisplayMessage]) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(messages)?);
    Ok(())
}

async fn check_config(
    backend: &HttpBackend,
    data_dir: &Path,
    file: &Path,
    against_bundle: bool,
    save: bool,
) -> AppResult<()> {
    let raw = std::fs::read_to_string(file)?;
    let config: SessionConfig = serde_json::from_str(&raw)?;

    let source = if against_bundle {
        let bundle = resolver::fetch_bundle(backend, false).await?;
        ConfigSource::Bundle {
            bundle,
            selection: config,
        }
    } else {
        ConfigSource::Navigation(config)
    };

    let resolver = if save {
        ConfigResolver::new(open_store(data_dir)?)
    } else {
        ConfigResolver::new(Arc::new(MemorySessionStore::new()))
    };
    let resolved = resolver.resolve(source)?;

    println!("{}", serde_json::to_string_pretty(&resolved)?);
    if save {
        tracing::info!("Session config saved");
    }
    Ok(())
}

async fn history(
    backend: &HttpBackend,
    intro: &str,
    chat_room: Option<i64>,
    session: Option<String>,
) -> AppResult<()> {
    let rows = match (chat_room, session) {
        (Some(id), _) => backend.chat_room_messages(id).await?,
        (None, Some(id)) => backend.session_messages(&id).await?,
        (None, None) => return Err("either --chat-room or --session is required".into()),
    };
    tracing::info!(count = rows.len(), "History loaded");

    let mut reconciler = ChatLogReconciler::new(intro);
    reconciler.restore(rows.iter().map(StoredMessage::to_restored).collect());
    print_messages(&reconciler.initial_display())
}

fn replay(file: &Path, intro: &str) -> AppResult<()> {
    let raw = std::fs::read_to_string(file)?;
    let entries: Vec<ChatLogEntry> = serde_json::from_str(&raw)?;

    let mut reconciler = ChatLogReconciler::new(intro);
    let outcome = reconciler.reconcile(&entries);
    for text in &outcome.new_assistant_messages {
        tracing::debug!(text_len = text.len(), "Assistant message");
    }
    print_messages(&outcome.messages)
}

fn status(data_dir: &Path) -> AppResult<()> {
    let store = open_store(data_dir)?;
    let session_id = store.session_id()?;
    let cached = match &session_id {
        Some(id) => store.cached_messages(id)?.len(),
        None => 0,
    };
    let summary = serde_json::json!({
        "sessionId": session_id,
        "chatRoomId": store.chat_room_id()?,
        "config": store.load_config()?,
        "cachedMessages": cached,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = RaonConfig::load_or_default(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }
    config.backend.base_url = args.resolve_base_url(&config.backend.base_url);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(path = %config_file.display(), "Configuration loaded");

    let data_dir = resolve_data_dir(&config.general.data_dir);
    let backend = HttpBackend::from_config(&config.backend)?;
    let intro = config.session.default_intro_message.clone();

    match args.command {
        Command::CheckConfig { file, bundle, save } => {
            check_config(&backend, &data_dir, &file, bundle, save).await
        }
        Command::History { chat_room, session } => {
            history(&backend, &intro, chat_room, session).await
        }
        Command::Replay { file, intro: custom } => replay(&file, custom.as_deref().unwrap_or(&intro)),
        Command::Terminate { session_id } => {
            backend.terminate_session(&session_id).await?;
            tracing::info!(%session_id, "Session terminated");
            Ok(())
        }
        Command::Status => status(&data_dir),
    }
}
