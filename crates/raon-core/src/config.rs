use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RaonError, Result};

/// Greeting shown as the first chat bubble when the selected prompt has no
/// intro message of its own.
pub const DEFAULT_INTRO_MESSAGE: &str = "Hello! Shall we get started?";

/// Top-level configuration for the Raon session core.
///
/// Loaded from `~/.raon/config.toml` by default. Each section corresponds
/// to one collaborator of the session controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaonConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub voice: VoiceConfig,
}

impl RaonConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RaonConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| RaonError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the session store database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.raon/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Backend REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL every REST path is joined onto.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8086/raon/api".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Streaming session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Delay before the single reconnect attempt after an unexpected close.
    pub reconnect_delay_ms: u64,
    /// Upper bound on automatic reconnects since the last user-initiated
    /// create. `None` is unbounded.
    pub max_reconnect_attempts: Option<u32>,
    /// Requested video width in pixels.
    pub video_width: u32,
    /// Requested video height in pixels.
    pub video_height: u32,
    /// Whether the SDK's own voice chat is enabled for the session.
    pub enable_voice: bool,
    /// Intro message used when the session config carries none.
    pub default_intro_message: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 5_000,
            max_reconnect_attempts: None,
            video_width: 1920,
            video_height: 1080,
            enable_voice: false,
            default_intro_message: DEFAULT_INTRO_MESSAGE.to_string(),
        }
    }
}

impl SessionSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Voice input settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Whether the microphone button is offered at all.
    pub enabled: bool,
    /// BCP 47 language tag passed to the speech recognizer.
    pub language: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "ko-KR".to_string(),
        }
    }
}
