use std::fmt;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Ai,
}

impl Role {
    /// Map a backend role string (`"user"`, `"assistant"`, `"ai"`) to a role.
    ///
    /// Anything that is not user-authored is treated as the avatar's side.
    pub fn from_backend(role: &str) -> Self {
        if role.eq_ignore_ascii_case("user") {
            Role::User
        } else {
            Role::Ai
        }
    }

    /// Role string the backend expects when persisting a message.
    pub fn as_backend(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Ai => "assistant",
        }
    }
}

/// Lifecycle state of the streaming avatar session.
///
/// Transitions:
/// - Idle -> Creating (create requested)
/// - Creating -> Active (handle attached and subscribed)
/// - Creating -> Idle (creation failed or was abandoned)
/// - Active -> Idle (manual close)
/// - Active -> Reconnecting (unexpected close)
/// - Active -> Creating (explicit replacement of the active session)
/// - Reconnecting -> Creating (scheduled retry fired)
/// - Reconnecting -> Idle (manual close or retry budget exhausted)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Creating,
    Active,
    Reconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Creating => write!(f, "Creating"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

impl SessionState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::Creating)
                | (SessionState::Creating, SessionState::Active)
                | (SessionState::Creating, SessionState::Idle)
                | (SessionState::Active, SessionState::Idle)
                | (SessionState::Active, SessionState::Reconnecting)
                | (SessionState::Active, SessionState::Creating)
                | (SessionState::Reconnecting, SessionState::Creating)
                | (SessionState::Reconnecting, SessionState::Idle)
        )
    }
}

// =============================================================================
// Newtype Wrappers - Temporal
// =============================================================================

/// Unix timestamp in milliseconds since epoch, the unit the avatar SDK uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    /// Interpret a backend `LocalDateTime` (no offset) in the local zone.
    pub fn from_local_naive(naive: NaiveDateTime) -> Self {
        match Local.from_local_datetime(&naive).earliest() {
            Some(dt) => Self(dt.timestamp_millis()),
            None => Self(naive.and_utc().timestamp_millis()),
        }
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// Wall-clock label shown under a chat bubble, e.g. `03:12 PM`.
    pub fn clock_label(&self) -> String {
        self.to_datetime()
            .with_timezone(&Local)
            .format("%I:%M %p")
            .to_string()
    }
}

// =============================================================================
// Session configuration
// =============================================================================

/// Immutable selection bundle a streaming session is created from.
///
/// Required: `llm_type`, `tts_type`, `prompt_id`. Serialized with the
/// backend's camelCase keys so the same value can be persisted and posted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default)]
    pub llm_type: String,
    #[serde(default)]
    pub tts_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stt_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_style: Option<String>,
    #[serde(default)]
    pub prompt_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro_message: Option<String>,
}

impl SessionConfig {
    /// Names of required fields that are absent or blank, in wire spelling.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.llm_type.trim().is_empty() {
            missing.push("llmType");
        }
        if self.tts_type.trim().is_empty() {
            missing.push("ttsType");
        }
        if self.prompt_id.trim().is_empty() {
            missing.push("promptId");
        }
        missing
    }

    /// Whether voice input can be offered for sessions built from this config.
    pub fn has_stt(&self) -> bool {
        self.stt_type
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

// =============================================================================
// Chat messages
// =============================================================================

/// One entry of the chat log pushed by the avatar SDK.
///
/// The SDK assigns no id and does not guarantee arrival order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLogEntry {
    pub text: String,
    pub is_user: bool,
    pub timestamp: i64,
}

impl ChatLogEntry {
    pub fn role(&self) -> Role {
        if self.is_user {
            Role::User
        } else {
            Role::Ai
        }
    }
}

/// A message from an earlier session, restored from backend persistence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoredMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: i64,
}

/// Identity of a reconciled chat bubble.
///
/// `Intro` serializes as the number `0`, `Loading` as the string
/// `"loading"`, every other message as its id string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DisplayId {
    Intro,
    Loading,
    Message(String),
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayId::Intro => write!(f, "0"),
            DisplayId::Loading => write!(f, "loading"),
            DisplayId::Message(id) => write!(f, "{}", id),
        }
    }
}

impl Serialize for DisplayId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DisplayId::Intro => serializer.serialize_u64(0),
            DisplayId::Loading => serializer.serialize_str("loading"),
            DisplayId::Message(id) => serializer.serialize_str(id),
        }
    }
}

impl<'de> Deserialize<'de> for DisplayId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct DisplayIdVisitor;

        impl<'de> Visitor<'de> for DisplayIdVisitor {
            type Value = DisplayId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("the number 0, \"loading\", or a message id string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<DisplayId, E> {
                if v == 0 {
                    Ok(DisplayId::Intro)
                } else {
                    Ok(DisplayId::Message(v.to_string()))
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<DisplayId, E> {
                if v == 0 {
                    Ok(DisplayId::Intro)
                } else {
                    Ok(DisplayId::Message(v.to_string()))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<DisplayId, E> {
                if v == "loading" {
                    Ok(DisplayId::Loading)
                } else {
                    Ok(DisplayId::Message(v.to_string()))
                }
            }
        }

        deserializer.deserialize_any(DisplayIdVisitor)
    }
}

/// A reconciled, UI-facing chat bubble.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub id: DisplayId,
    #[serde(rename = "type")]
    pub role: Role,
    pub text: String,
    pub timestamp: i64,
    pub time: String,
}

impl DisplayMessage {
    /// The synthetic greeting that always heads the list.
    pub fn intro(text: &str, timestamp: i64) -> Self {
        Self {
            id: DisplayId::Intro,
            role: Role::Ai,
            text: text.to_string(),
            timestamp,
            time: Timestamp(timestamp).clock_label(),
        }
    }

    /// The typing placeholder shown while a reply is awaited.
    pub fn loading(timestamp: i64) -> Self {
        Self {
            id: DisplayId::Loading,
            role: Role::Ai,
            text: String::new(),
            timestamp,
            time: String::new(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self.id, DisplayId::Intro | DisplayId::Loading)
    }
}

impl From<&RestoredMessage> for DisplayMessage {
    fn from(msg: &RestoredMessage) -> Self {
        Self {
            id: DisplayId::Message(msg.id.clone()),
            role: msg.role,
            text: msg.text.clone(),
            timestamp: msg.timestamp,
            time: Timestamp(msg.timestamp).clock_label(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
