//! Session config resolution and validation.
//!
//! A config can come from the previous screen, from the persisted snapshot
//! after a reload, or from selections made against the backend's
//! configuration bundle. Whatever the source, required fields are checked
//! before any session is created and the winner is persisted.

use std::sync::Arc;

use raon_core::types::SessionConfig;
use raon_storage::SessionStore;

use crate::backend::{Backend, ConfigurationBundle, Credentials, ModelInfo};
use crate::error::{ConfigError, SessionError};

/// Where a session config comes from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Carried over from the setup screen.
    Navigation(SessionConfig),
    /// The snapshot saved by the last successful resolution.
    Persisted,
    /// Ids selected against a configuration bundle.
    Bundle {
        bundle: ConfigurationBundle,
        selection: SessionConfig,
    },
}

/// Check that `llmType`, `ttsType`, and `promptId` are present.
pub fn validate(config: &SessionConfig) -> Result<(), ConfigError> {
    let missing = config.missing_required_fields();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingFields(missing))
    }
}

/// Resolves and persists session configs.
#[derive(Clone)]
pub struct ConfigResolver {
    store: Arc<dyn SessionStore>,
}

impl ConfigResolver {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn resolve(&self, source: ConfigSource) -> Result<SessionConfig, ConfigError> {
        let config = match source {
            ConfigSource::Navigation(config) => config,
            ConfigSource::Persisted => self
                .store
                .load_config()
                .map_err(|e| ConfigError::Store(e.to_string()))?
                .ok_or(ConfigError::NotPersisted)?,
            ConfigSource::Bundle { bundle, selection } => apply_bundle(&bundle, selection)?,
        };

        validate(&config)?;

        self.store
            .save_config(&config)
            .map_err(|e| ConfigError::Store(e.to_string()))?;
        tracing::debug!(
            llm_type = %config.llm_type,
            tts_type = %config.tts_type,
            prompt_id = %config.prompt_id,
            "Session config resolved"
        );
        Ok(config)
    }
}

/// Check each selected id against the bundle and fill the intro message
/// from the chosen prompt when the selection carries none.
fn apply_bundle(
    bundle: &ConfigurationBundle,
    mut selection: SessionConfig,
) -> Result<SessionConfig, ConfigError> {
    validate(&selection)?;

    let prompt = bundle
        .prompts
        .iter()
        .find(|p| p.prompt_id == selection.prompt_id)
        .ok_or_else(|| ConfigError::UnknownSelection {
            kind: "prompt",
            id: selection.prompt_id.clone(),
        })?;

    check_model("LLM", &bundle.llm_models, &selection.llm_type)?;
    check_model("TTS", &bundle.tts_models, &selection.tts_type)?;
    if let Some(stt) = selection.stt_type.as_deref() {
        check_model("STT", &bundle.stt_models, stt)?;
    }

    if let Some(id) = selection.document_id.as_deref() {
        if !bundle.documents.iter().any(|d| d.document_id == id) {
            return Err(unknown("document", id));
        }
    }
    if let Some(id) = selection.background_image_id.as_deref() {
        if !bundle
            .background_images
            .iter()
            .any(|b| b.background_image_id == id)
        {
            return Err(unknown("background image", id));
        }
    }
    if let Some(style) = selection.model_style.as_deref() {
        if !bundle.model_styles.is_empty() && !bundle.model_styles.iter().any(|m| m.offers(style)) {
            return Err(unknown("model style", style));
        }
    }

    if selection.intro_message.is_none() {
        selection.intro_message = prompt.intro_message.clone();
    }
    Ok(selection)
}

/// An empty model list means the provider did not report any; accept the
/// selection as-is.
fn check_model(kind: &'static str, models: &[ModelInfo], name: &str) -> Result<(), ConfigError> {
    if models.is_empty() || models.iter().any(|m| m.name == name) {
        Ok(())
    } else {
        Err(unknown(kind, name))
    }
}

fn unknown(kind: &'static str, id: &str) -> ConfigError {
    ConfigError::UnknownSelection {
        kind,
        id: id.to_string(),
    }
}

/// Load the configuration bundle, optionally bypassing the backend cache.
pub async fn fetch_bundle(
    backend: &dyn Backend,
    force_refresh: bool,
) -> Result<ConfigurationBundle, SessionError> {
    let bundle = backend.configuration_bundle(force_refresh).await?;
    tracing::info!(
        prompts = bundle.prompts.len(),
        documents = bundle.documents.len(),
        backgrounds = bundle.background_images.len(),
        styles = bundle.model_styles.len(),
        llms = bundle.llm_models.len(),
        tts = bundle.tts_models.len(),
        "Configuration bundle loaded"
    );
    Ok(bundle)
}

pub async fn fetch_credentials(backend: &dyn Backend) -> Result<Credentials, SessionError> {
    let credentials = backend.credentials().await?;
    tracing::debug!(api_server = %credentials.api_server, "Credentials loaded");
    Ok(credentials)
}
