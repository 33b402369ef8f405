//! Error types for voice input.

use raon_core::error::RaonError;

/// Failure codes reported by the speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    AudioCapture,
    NotAllowed,
    Other(String),
}

impl RecognitionErrorKind {
    /// Parse a recognizer error code (`"no-speech"`, `"audio-capture"`,
    /// `"not-allowed"`, anything else).
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => RecognitionErrorKind::NoSpeech,
            "audio-capture" => RecognitionErrorKind::AudioCapture,
            "not-allowed" => RecognitionErrorKind::NotAllowed,
            other => RecognitionErrorKind::Other(other.to_string()),
        }
    }

    /// Message shown to the user in the transient error banner.
    pub fn user_message(&self) -> String {
        match self {
            RecognitionErrorKind::NoSpeech => "No speech was detected. Please try again.".into(),
            RecognitionErrorKind::AudioCapture => {
                "No microphone was found. Check your input device.".into()
            }
            RecognitionErrorKind::NotAllowed => {
                "Microphone permission was denied. Allow access in the browser settings.".into()
            }
            RecognitionErrorKind::Other(code) => format!("Speech recognition error: {}", code),
        }
    }
}

/// Errors from the voice input coordinator.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("voice input is not configured for this session")]
    Unavailable,
    #[error("no active session to send voice input to")]
    SessionInactive,
    #[error("voice input is already listening")]
    AlreadyListening,
    #[error("voice input is not listening")]
    NotListening,
    #[error("invalid voice state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("{}", .0.user_message())]
    Recognition(RecognitionErrorKind),
    #[error("microphone error: {0}")]
    Microphone(String),
    #[error("failed to send transcript: {0}")]
    Send(String),
}

impl From<VoiceError> for RaonError {
    fn from(err: VoiceError) -> Self {
        RaonError::Voice(err.to_string())
    }
}

impl From<RaonError> for VoiceError {
    fn from(err: RaonError) -> Self {
        VoiceError::Send(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code() {
        assert_eq!(
            RecognitionErrorKind::from_code("no-speech"),
            RecognitionErrorKind::NoSpeech
        );
        assert_eq!(
            RecognitionErrorKind::from_code("audio-capture"),
            RecognitionErrorKind::AudioCapture
        );
        assert_eq!(
            RecognitionErrorKind::from_code("not-allowed"),
            RecognitionErrorKind::NotAllowed
        );
        assert_eq!(
            RecognitionErrorKind::from_code("network"),
            RecognitionErrorKind::Other("network".into())
        );
    }

    #[test]
    fn test_recognition_error_display_is_user_message() {
        let err = VoiceError::Recognition(RecognitionErrorKind::NotAllowed);
        assert!(err.to_string().contains("permission was denied"));

        let err = VoiceError::Recognition(RecognitionErrorKind::Other("aborted".into()));
        assert_eq!(err.to_string(), "Speech recognition error: aborted");
    }

    #[test]
    fn test_voice_error_into_raon_error() {
        let err: RaonError = VoiceError::SessionInactive.into();
        assert!(matches!(err, RaonError::Voice(_)));
        assert!(err.to_string().contains("no active session"));
    }

    #[test]
    fn test_raon_error_into_send_error() {
        let err: VoiceError = RaonError::Session("closed".into()).into();
        assert!(matches!(err, VoiceError::Send(_)));
    }
}
