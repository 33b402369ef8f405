//! Raon Voice crate - microphone input for the avatar chat.
//!
//! Runs browser-style continuous speech recognition and a raw audio
//! recorder as one pair behind a single `listening` flag:
//! Idle -> Listening -> Stopping -> Idle. The recognized transcript is
//! flushed into the active session exactly once per listening window,
//! whether the user stops it or recognition ends on its own.

pub mod coordinator;
pub mod error;
pub mod input;
pub mod state;

pub use coordinator::VoiceInputCoordinator;
pub use error::{RecognitionErrorKind, VoiceError};
pub use input::{AudioRecorder, Recording, SpeechRecognizer, TranscriptSink};
pub use state::VoiceState;
