//! Backend REST API seam and its wire types.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use raon_core::types::{RestoredMessage, Role, SessionConfig, Timestamp};

use crate::error::BackendError;

/// Streaming provider credentials from `GET /persoai/credentials`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub api_server: String,
    pub api_key: String,
}

/// Body of `POST /sessions/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub prompt_id: String,
    pub llm_type: String,
    pub tts_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stt_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability: Vec<String>,
    /// Chat room of the prior session, so the backend can carry context over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_chat_room_id: Option<i64>,
}

impl CreateSessionRequest {
    pub fn from_config(config: &SessionConfig, previous_chat_room_id: Option<i64>) -> Self {
        let mut capability = vec!["LLM".to_string(), "TTS".to_string()];
        if config.has_stt() {
            capability.push("STT".to_string());
        }

        Self {
            prompt_id: config.prompt_id.clone(),
            llm_type: config.llm_type.clone(),
            tts_type: config.tts_type.clone(),
            stt_type: config.stt_type.clone().filter(|s| !s.trim().is_empty()),
            model_style: config.model_style.clone(),
            document_id: config.document_id.clone(),
            background_image_id: config.background_image_id.clone(),
            capability,
            previous_chat_room_id,
        }
    }
}

/// Response of `POST /sessions/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: String,
    #[serde(default)]
    pub chat_room_id: Option<i64>,
}

/// One persisted message row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub message_id: i64,
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
    /// Server-local date-time without offset.
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

impl StoredMessage {
    pub fn to_restored(&self) -> RestoredMessage {
        let timestamp = self
            .created_at
            .map(Timestamp::from_local_naive)
            .unwrap_or_else(Timestamp::now);
        RestoredMessage {
            id: self.message_id.to_string(),
            role: Role::from_backend(&self.role),
            text: self.content.clone(),
            timestamp: timestamp.0,
        }
    }
}

/// Body of `POST /sessions/{id}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSaveRequest {
    pub role: String,
    pub content: String,
}

impl MessageSaveRequest {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: role.as_backend().to_string(),
            content: content.into(),
        }
    }
}

// =============================================================================
// Configuration bundle
// =============================================================================

/// Everything the session setup screen chooses from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigurationBundle {
    pub prompts: Vec<PromptInfo>,
    pub documents: Vec<DocumentInfo>,
    pub background_images: Vec<BackgroundImageInfo>,
    pub model_styles: Vec<ModelStyleInfo>,
    pub llm_models: Vec<ModelInfo>,
    pub tts_models: Vec<ModelInfo>,
    pub stt_models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInfo {
    pub prompt_id: String,
    pub name: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub intro_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub document_id: String,
    pub name: String,
    #[serde(default)]
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundImageInfo {
    pub background_image_id: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStyleInfo {
    pub name: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub styles: Vec<String>,
}

impl ModelStyleInfo {
    pub fn offers(&self, style: &str) -> bool {
        self.name == style || self.styles.iter().any(|s| s == style)
    }
}

/// An LLM, TTS, or STT model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

// =============================================================================
// Backend trait
// =============================================================================

/// The backend REST API the session core talks to.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn credentials(&self) -> Result<Credentials, BackendError>;

    async fn configuration_bundle(
        &self,
        force_refresh: bool,
    ) -> Result<ConfigurationBundle, BackendError>;

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, BackendError>;

    async fn session_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>, BackendError>;

    async fn chat_room_messages(&self, chat_room_id: i64)
        -> Result<Vec<StoredMessage>, BackendError>;

    async fn save_message(
        &self,
        session_id: &str,
        request: &MessageSaveRequest,
    ) -> Result<(), BackendError>;

    async fn terminate_session(&self, session_id: &str) -> Result<(), BackendError>;
}
