use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{DisplayMessage, SessionState, Timestamp};

/// All domain events the session core emits.
///
/// Events are consumed by:
/// - The UI layer (banners, message list, microphone button)
/// - The log (for debugging reconnect and voice issues)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DomainEvent {
    // =========================================================================
    // Session Lifecycle Events
    // =========================================================================
    /// The session controller moved between lifecycle states.
    SessionStateChanged {
        from: SessionState,
        to: SessionState,
        timestamp: Timestamp,
    },

    /// A streaming session became active.
    SessionCreated {
        session_id: String,
        chat_room_id: Option<i64>,
        timestamp: Timestamp,
    },

    /// A streaming session ended, by the user or unexpectedly.
    SessionClosed {
        session_id: Option<String>,
        manual: bool,
        timestamp: Timestamp,
    },

    /// An unexpected close was observed and one reconnect is scheduled.
    Reconnecting {
        attempt: u32,
        delay_ms: u64,
        timestamp: Timestamp,
    },

    /// A user-visible session failure (creation failed, retries exhausted).
    SessionFailed {
        message: String,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Chat Events
    // =========================================================================
    /// The reconciled message list changed.
    MessagesUpdated {
        messages: Vec<DisplayMessage>,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Voice Events
    // =========================================================================
    /// The microphone button flipped between listening and idle.
    ListeningChanged {
        listening: bool,
        timestamp: Timestamp,
    },

    /// A recognized transcript was handed to the session.
    TranscriptSent {
        text_length: usize,
        timestamp: Timestamp,
    },

    /// A local recording of the listening window is ready for download.
    RecordingReady {
        recording_id: Uuid,
        size_bytes: usize,
        timestamp: Timestamp,
    },

    /// A user-visible voice input failure.
    VoiceFailed {
        message: String,
        timestamp: Timestamp,
    },
}

impl DomainEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DomainEvent::SessionStateChanged { timestamp, .. }
            | DomainEvent::SessionCreated { timestamp, .. }
            | DomainEvent::SessionClosed { timestamp, .. }
            | DomainEvent::Reconnecting { timestamp, .. }
            | DomainEvent::SessionFailed { timestamp, .. }
            | DomainEvent::MessagesUpdated { timestamp, .. }
            | DomainEvent::ListeningChanged { timestamp, .. }
            | DomainEvent::TranscriptSent { timestamp, .. }
            | DomainEvent::RecordingReady { timestamp, .. }
            | DomainEvent::VoiceFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a human-readable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEvent::SessionStateChanged { .. } => "session_state_changed",
            DomainEvent::SessionCreated { .. } => "session_created",
            DomainEvent::SessionClosed { .. } => "session_closed",
            DomainEvent::Reconnecting { .. } => "reconnecting",
            DomainEvent::SessionFailed { .. } => "session_failed",
            DomainEvent::MessagesUpdated { .. } => "messages_updated",
            DomainEvent::ListeningChanged { .. } => "listening_changed",
            DomainEvent::TranscriptSent { .. } => "transcript_sent",
            DomainEvent::RecordingReady { .. } => "recording_ready",
            DomainEvent::VoiceFailed { .. } => "voice_failed",
        }
    }

    /// Whether the UI should surface this event as a transient banner.
    pub fn is_user_notice(&self) -> bool {
        matches!(
            self,
            DomainEvent::Reconnecting { .. }
                | DomainEvent::SessionFailed { .. }
                | DomainEvent::VoiceFailed { .. }
        )
    }
}

/// Broadcast fan-out for domain events.
///
/// Publishing never fails: with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: DomainEvent) {
        tracing::trace!(event = event.event_name(), "Publishing domain event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}
