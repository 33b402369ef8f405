//! Capability traits for the microphone pair and the transcript consumer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use raon_core::error::RaonError;

use crate::error::VoiceError;

/// A finished local recording of one listening window.
#[derive(Debug, Clone)]
pub struct Recording {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Container type, e.g. `audio/webm`.
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Recording {
    /// Suggested download file name, e.g. `voice-20250101-120000.webm`.
    pub fn file_name(&self) -> String {
        let ext = self
            .mime_type
            .split('/')
            .nth(1)
            .and_then(|sub| sub.split(';').next())
            .filter(|sub| !sub.is_empty())
            .unwrap_or("bin");
        format!("voice-{}.{}", self.started_at.format("%Y%m%d-%H%M%S"), ext)
    }
}

/// Continuous speech recognition.
///
/// Results, natural end, and errors are reported back through
/// `VoiceInputCoordinator::on_result`, `on_end`, and `on_error`.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn start(&self, language: &str) -> Result<(), VoiceError>;
    async fn stop(&self) -> Result<(), VoiceError>;
}

/// Raw audio capture of the same input window.
///
/// `start` acquires the microphone track; `stop` releases it and returns
/// what was captured.
#[async_trait]
pub trait AudioRecorder: Send + Sync {
    async fn start(&self) -> Result<(), VoiceError>;
    async fn stop(&self) -> Result<Recording, VoiceError>;
}

/// Where recognized text goes: the active avatar session.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    /// Whether a session is active and can take input right now.
    fn accepts_input(&self) -> bool;
    async fn send_text(&self, text: &str) -> Result<(), RaonError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn recording(mime: &str) -> Recording {
        Recording {
            id: Uuid::new_v4(),
            started_at: Utc.with_ymd_and_hms(2025, 11, 10, 9, 30, 5).unwrap(),
            duration_ms: 1200,
            mime_type: mime.to_string(),
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_file_name_from_mime() {
        assert_eq!(recording("audio/webm").file_name(), "voice-20251110-093005.webm");
        assert_eq!(
            recording("audio/ogg;codecs=opus").file_name(),
            "voice-20251110-093005.ogg"
        );
        assert_eq!(recording("").file_name(), "voice-20251110-093005.bin");
    }
}
