//! CLI argument definitions for the Raon session driver.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Raon: drive and inspect avatar interview sessions from the terminal.
#[derive(Parser, Debug)]
#[command(name = "raon", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Backend API root, e.g. http://localhost:8086/raon/api.
    #[arg(short = 'u', long = "base-url", global = true)]
    pub base_url: Option<String>,

    /// Data directory for the session state database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a session config JSON file.
    CheckConfig {
        file: PathBuf,
        /// Also check the selected ids against the backend's configuration bundle.
        #[arg(long)]
        bundle: bool,
        /// Persist the resolved config as the current session config.
        #[arg(long)]
        save: bool,
    },
    /// Print the reconciled history of a chat room or session.
    History {
        #[arg(long = "chat-room", conflicts_with = "session", required_unless_present = "session")]
        chat_room: Option<i64>,
        #[arg(long)]
        session: Option<String>,
    },
    /// Run a recorded chat log JSON through the reconciler.
    Replay {
        file: PathBuf,
        /// Intro message to head the list.
        #[arg(long)]
        intro: Option<String>,
    },
    /// Terminate a backend session.
    Terminate { session_id: String },
    /// Show the persisted session state.
    Status,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > RAON_CONFIG env var > platform default (~/.raon/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("RAON_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the backend base URL.
    ///
    /// Priority: --base-url flag > RAON_BASE_URL env var > config file value.
    pub fn resolve_base_url(&self, config_url: &str) -> String {
        if let Some(ref url) = self.base_url {
            return url.clone();
        }
        if let Ok(url) = std::env::var("RAON_BASE_URL") {
            if !url.trim().is_empty() {
                return url;
            }
        }
        config_url.to_string()
    }

    /// Priority: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".raon").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".raon").join("config.toml");
    }
    PathBuf::from("config.toml")
}
