//! Voice input coordinator: one `listening` flag over a recognizer/recorder pair.
//!
//! Both the explicit stop and a natural recognition end converge on
//! `finish`, which flushes the accumulated transcript into the session and
//! finalizes the recording. The state machine guarantees only one of them
//! gets to run per listening window.

use std::sync::{Arc, Mutex, MutexGuard};

use raon_core::events::{DomainEvent, EventBus};
use raon_core::types::Timestamp;

use crate::error::{RecognitionErrorKind, VoiceError};
use crate::input::{AudioRecorder, Recording, SpeechRecognizer, TranscriptSink};
use crate::state::{StateMachine, VoiceState};

/// Transcript accumulated across recognizer results of one window.
#[derive(Debug, Default)]
struct TranscriptBuffer {
    finalized: String,
    interim: String,
}

impl TranscriptBuffer {
    fn push(&mut self, text: &str, is_final: bool) {
        if is_final {
            let text = text.trim();
            if !text.is_empty() {
                if !self.finalized.is_empty() {
                    self.finalized.push(' ');
                }
                self.finalized.push_str(text);
            }
            self.interim.clear();
        } else {
            self.interim = text.trim().to_string();
        }
    }

    /// Drain the buffer into the text that should be sent.
    fn take(&mut self) -> String {
        let mut text = std::mem::take(&mut self.finalized);
        let interim = std::mem::take(&mut self.interim);
        if !interim.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&interim);
        }
        text
    }

    fn clear(&mut self) {
        self.finalized.clear();
        self.interim.clear();
    }
}

/// Coordinates speech recognition, the local recorder, and the session's
/// send-text into one user-facing listening state.
pub struct VoiceInputCoordinator {
    state_machine: StateMachine,
    transcript: Mutex<TranscriptBuffer>,
    last_recording: Mutex<Option<Recording>>,
    recognizer: Arc<dyn SpeechRecognizer>,
    recorder: Arc<dyn AudioRecorder>,
    sink: Arc<dyn TranscriptSink>,
    stt_type: Option<String>,
    language: String,
    events: EventBus,
}

impl std::fmt::Debug for VoiceInputCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceInputCoordinator")
            .field("state_machine", &self.state_machine)
            .field("stt_type", &self.stt_type)
            .field("language", &self.language)
            .finish()
    }
}

impl VoiceInputCoordinator {
    /// Create a coordinator.
    ///
    /// `stt_type` is the session config's STT selection; without one the
    /// coordinator refuses to start.
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        recorder: Arc<dyn AudioRecorder>,
        sink: Arc<dyn TranscriptSink>,
        stt_type: Option<String>,
        language: impl Into<String>,
        events: EventBus,
    ) -> Self {
        Self {
            state_machine: StateMachine::new(),
            transcript: Mutex::new(TranscriptBuffer::default()),
            last_recording: Mutex::new(None),
            recognizer,
            recorder,
            sink,
            stt_type: stt_type.filter(|s| !s.trim().is_empty()),
            language: language.into(),
            events,
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state_machine.current()
    }

    /// The flag the microphone button renders.
    pub fn listening(&self) -> bool {
        self.state_machine.current() == VoiceState::Listening
    }

    /// Whether the microphone button should be offered and enabled.
    pub fn is_available(&self) -> bool {
        self.stt_type.is_some() && self.sink.accepts_input()
    }

    /// The most recent finished recording, if any, for download.
    pub fn last_recording(&self) -> Option<Recording> {
        lock(&self.last_recording).clone()
    }

    /// Start listening if idle, stop if listening.
    pub async fn toggle(&self) -> Result<Option<Recording>, VoiceError> {
        if self.listening() {
            self.stop().await
        } else {
            self.start().await.map(|()| None)
        }
    }

    /// Acquire the microphone and start recorder and recognizer together.
    pub async fn start(&self) -> Result<(), VoiceError> {
        if self.stt_type.is_none() {
            return Err(VoiceError::Unavailable);
        }
        if !self.sink.accepts_input() {
            return Err(VoiceError::SessionInactive);
        }
        self.state_machine
            .transition(VoiceState::Listening)
            .map_err(|_| VoiceError::AlreadyListening)?;
        lock(&self.transcript).clear();

        if let Err(e) = self.recorder.start().await {
            self.state_machine.reset();
            self.notify_failure(&e);
            return Err(e);
        }

        if let Err(e) = self.recognizer.start(&self.language).await {
            // Recorder is already holding the microphone.
            if let Err(stop_err) = self.recorder.stop().await {
                tracing::warn!(error = %stop_err, "Failed to release recorder after recognizer error");
            }
            self.state_machine.reset();
            self.notify_failure(&e);
            return Err(e);
        }

        tracing::info!(language = %self.language, "Voice input started");
        self.events.publish(DomainEvent::ListeningChanged {
            listening: true,
            timestamp: Timestamp::now(),
        });
        Ok(())
    }

    /// Explicit stop: stop recognition, flush the transcript, finalize the
    /// recording.
    pub async fn stop(&self) -> Result<Option<Recording>, VoiceError> {
        self.state_machine
            .transition(VoiceState::Stopping)
            .map_err(|_| VoiceError::NotListening)?;

        if let Err(e) = self.recognizer.stop().await {
            tracing::warn!(error = %e, "Speech recognizer did not stop cleanly");
        }
        self.finish().await
    }

    /// A recognizer result arrived. Ignored outside a listening window.
    pub fn on_result(&self, text: &str, is_final: bool) {
        if self.state_machine.current() != VoiceState::Listening {
            tracing::debug!("Dropping recognition result outside listening window");
            return;
        }
        lock(&self.transcript).push(text, is_final);
    }

    /// Recognition ended on its own. Takes the same flush path as `stop`;
    /// a no-op when an explicit stop already claimed the window.
    pub async fn on_end(&self) -> Result<Option<Recording>, VoiceError> {
        if self.state_machine.transition(VoiceState::Stopping).is_err() {
            tracing::debug!("Recognition end after stop; nothing to flush");
            return Ok(None);
        }
        tracing::debug!("Recognition ended naturally");
        self.finish().await
    }

    /// The recognizer reported an error. Clears the transcript and surfaces
    /// a message. Inside a listening window it also releases the microphone
    /// and returns to Idle; while a flush is running, `finish` keeps
    /// ownership of the window and its return to Idle.
    pub async fn on_error(&self, kind: RecognitionErrorKind) -> VoiceError {
        let error = VoiceError::Recognition(kind);
        let was_listening = self.state_machine.transition(VoiceState::Stopping).is_ok();
        lock(&self.transcript).clear();
        tracing::warn!(error = %error, "Voice input failed");

        if !was_listening {
            tracing::debug!(state = ?self.state_machine.current(), "Recognition error outside listening window");
            self.notify_failure(&error);
            return error;
        }

        if let Err(e) = self.recognizer.stop().await {
            tracing::debug!(error = %e, "Recognizer already stopped");
        }
        match self.recorder.stop().await {
            Ok(recording) => {
                tracing::debug!(recording_id = %recording.id, "Discarding recording after error")
            }
            Err(e) => tracing::warn!(error = %e, "Failed to release recorder after error"),
        }

        self.state_machine.reset();
        self.notify_failure(&error);
        self.publish_listening_off();
        error
    }

    /// Shared tail of `stop` and `on_end`. Runs in `Stopping`, always ends
    /// in `Idle`.
    async fn finish(&self) -> Result<Option<Recording>, VoiceError> {
        let text = lock(&self.transcript).take();

        let send_result = if text.is_empty() {
            tracing::debug!("No transcript to flush");
            Ok(())
        } else {
            match self.sink.send_text(&text).await {
                Ok(()) => {
                    tracing::info!(text_len = text.len(), "Transcript sent to session");
                    self.events.publish(DomainEvent::TranscriptSent {
                        text_length: text.len(),
                        timestamp: Timestamp::now(),
                    });
                    Ok(())
                }
                Err(e) => Err(VoiceError::from(e)),
            }
        };

        let recording = match self.recorder.stop().await {
            Ok(recording) => {
                self.events.publish(DomainEvent::RecordingReady {
                    recording_id: recording.id,
                    size_bytes: recording.data.len(),
                    timestamp: Timestamp::now(),
                });
                *lock(&self.last_recording) = Some(recording.clone());
                Some(recording)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Recorder did not produce a recording");
                None
            }
        };

        if let Err(e) = self.state_machine.transition(VoiceState::Idle) {
            tracing::warn!(error = %e, "Unexpected voice state after flush");
            self.state_machine.reset();
        }
        self.publish_listening_off();

        match send_result {
            Ok(()) => Ok(recording),
            Err(e) => {
                self.notify_failure(&e);
                Err(e)
            }
        }
    }

    fn publish_listening_off(&self) {
        self.events.publish(DomainEvent::ListeningChanged {
            listening: false,
            timestamp: Timestamp::now(),
        });
    }

    fn notify_failure(&self, error: &VoiceError) {
        self.events.publish(DomainEvent::VoiceFailed {
            message: error.to_string(),
            timestamp: Timestamp::now(),
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use raon_core::error::RaonError;
    use tokio::sync::Notify;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeRecognizer {
        running: AtomicBool,
        fail_start: AtomicBool,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl SpeechRecognizer for FakeRecognizer {
        async fn start(&self, _language: &str) -> Result<(), VoiceError> {
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(VoiceError::Recognition(RecognitionErrorKind::NotAllowed));
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<(), VoiceError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRecorder {
        mic_open: AtomicBool,
        fail_start: AtomicBool,
    }

    #[async_trait]
    impl AudioRecorder for FakeRecorder {
        async fn start(&self) -> Result<(), VoiceError> {
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(VoiceError::Microphone("device busy".into()));
            }
            self.mic_open.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<Recording, VoiceError> {
            if !self.mic_open.swap(false, Ordering::SeqCst) {
                return Err(VoiceError::Microphone("not recording".into()));
            }
            Ok(Recording {
                id: Uuid::new_v4(),
                started_at: Utc::now(),
                duration_ms: 800,
                mime_type: "audio/webm".into(),
                data: vec![0u8; 64],
            })
        }
    }

    struct FakeSink {
        active: AtomicBool,
        sent: Mutex<Vec<String>>,
        fail: AtomicBool,
        /// When set, `send_text` waits for `release` before delivering.
        hold: AtomicBool,
        release: Notify,
    }

    impl FakeSink {
        fn new(active: bool) -> Self {
            Self {
                active: AtomicBool::new(active),
                sent: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
                hold: AtomicBool::new(false),
                release: Notify::new(),
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TranscriptSink for FakeSink {
        fn accepts_input(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        async fn send_text(&self, text: &str) -> Result<(), RaonError> {
            if self.hold.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(RaonError::Session("session closed".into()));
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct Harness {
        recognizer: Arc<FakeRecognizer>,
        recorder: Arc<FakeRecorder>,
        sink: Arc<FakeSink>,
        events: EventBus,
        coordinator: VoiceInputCoordinator,
    }

    fn harness(stt_type: Option<&str>, session_active: bool) -> Harness {
        let recognizer = Arc::new(FakeRecognizer::default());
        let recorder = Arc::new(FakeRecorder::default());
        let sink = Arc::new(FakeSink::new(session_active));
        let events = EventBus::default();
        let coordinator = VoiceInputCoordinator::new(
            recognizer.clone(),
            recorder.clone(),
            sink.clone(),
            stt_type.map(str::to_string),
            "ko-KR",
            events.clone(),
        );
        Harness {
            recognizer,
            recorder,
            sink,
            events,
            coordinator,
        }
    }

    #[test]
    fn test_transcript_buffer_accumulates_final_and_interim() {
        let mut buf = TranscriptBuffer::default();
        buf.push("hello", false);
        buf.push("hello there", true);
        buf.push("how are", false);
        buf.push("how are you", false);
        assert_eq!(buf.take(), "hello there how are you");
        assert_eq!(buf.take(), "");
    }

    #[tokio::test]
    async fn test_start_requires_stt_type() {
        let h = harness(None, true);
        assert!(!h.coordinator.is_available());
        assert!(matches!(
            h.coordinator.start().await,
            Err(VoiceError::Unavailable)
        ));
        assert!(!h.coordinator.listening());
    }

    #[tokio::test]
    async fn test_start_requires_active_session() {
        let h = harness(Some("whisper"), false);
        assert!(matches!(
            h.coordinator.start().await,
            Err(VoiceError::SessionInactive)
        ));
        assert!(!h.recorder.mic_open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_start_runs_both_subsystems() {
        let h = harness(Some("whisper"), true);
        h.coordinator.start().await.unwrap();
        assert!(h.coordinator.listening());
        assert!(h.recognizer.running.load(Ordering::SeqCst));
        assert!(h.recorder.mic_open.load(Ordering::SeqCst));

        assert!(matches!(
            h.coordinator.start().await,
            Err(VoiceError::AlreadyListening)
        ));
    }

    #[tokio::test]
    async fn test_stop_flushes_transcript_and_finalizes_recording() {
        let h = harness(Some("whisper"), true);
        h.coordinator.start().await.unwrap();
        h.coordinator.on_result("I led a team", true);
        h.coordinator.on_result("of five", false);

        let recording = h.coordinator.stop().await.unwrap();
        assert!(recording.is_some());
        assert_eq!(h.sink.sent(), vec!["I led a team of five".to_string()]);
        assert!(!h.coordinator.listening());
        assert!(!h.recognizer.running.load(Ordering::SeqCst));
        assert!(!h.recorder.mic_open.load(Ordering::SeqCst));
        assert!(h.coordinator.last_recording().is_some());
    }

    #[tokio::test]
    async fn test_natural_end_flushes_once() {
        let h = harness(Some("whisper"), true);
        h.coordinator.start().await.unwrap();
        h.coordinator.on_result("my strength is focus", true);

        h.coordinator.on_end().await.unwrap();
        // A late end event after the window closed must not resend.
        h.coordinator.on_end().await.unwrap();

        assert_eq!(h.sink.sent(), vec!["my strength is focus".to_string()]);
        assert_eq!(h.coordinator.state(), VoiceState::Idle);
        assert!(!h.recorder.mic_open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stop_then_recognizer_end_does_not_double_flush() {
        let h = harness(Some("whisper"), true);
        h.coordinator.start().await.unwrap();
        h.coordinator.on_result("answer", true);
        h.coordinator.stop().await.unwrap();
        h.coordinator.on_end().await.unwrap();
        assert_eq!(h.sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_transcript_sends_nothing() {
        let h = harness(Some("whisper"), true);
        h.coordinator.start().await.unwrap();
        h.coordinator.stop().await.unwrap();
        assert!(h.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_rejected() {
        let h = harness(Some("whisper"), true);
        assert!(matches!(
            h.coordinator.stop().await,
            Err(VoiceError::NotListening)
        ));
    }

    #[tokio::test]
    async fn test_error_clears_buffer_and_releases_microphone() {
        let h = harness(Some("whisper"), true);
        let mut rx = h.events.subscribe();
        h.coordinator.start().await.unwrap();
        h.coordinator.on_result("partial answ", false);

        let err = h.coordinator.on_error(RecognitionErrorKind::NoSpeech).await;
        assert!(err.to_string().contains("No speech"));
        assert!(!h.coordinator.listening());
        assert!(!h.recorder.mic_open.load(Ordering::SeqCst));

        // Restarting must not resurrect the discarded transcript.
        h.coordinator.start().await.unwrap();
        h.coordinator.stop().await.unwrap();
        assert!(h.sink.sent().is_empty());

        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::VoiceFailed { message, .. } = event {
                assert!(message.contains("No speech"));
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn test_error_during_flush_keeps_window_until_flush_ends() {
        let h = harness(Some("whisper"), true);
        h.coordinator.start().await.unwrap();
        h.coordinator.on_result("hello", true);
        h.sink.hold.store(true, Ordering::SeqCst);

        let interleaved = async {
            while h.coordinator.state() != VoiceState::Stopping {
                tokio::task::yield_now().await;
            }
            h.coordinator.on_error(RecognitionErrorKind::NoSpeech).await;
            assert_eq!(h.coordinator.state(), VoiceState::Stopping);
            assert!(matches!(
                h.coordinator.start().await,
                Err(VoiceError::AlreadyListening)
            ));
            h.sink.release.notify_one();
        };
        let (stopped, ()) = tokio::join!(h.coordinator.stop(), interleaved);

        assert!(stopped.unwrap().is_some());
        assert_eq!(h.sink.sent(), vec!["hello".to_string()]);
        assert_eq!(h.coordinator.state(), VoiceState::Idle);
        assert!(!h.recognizer.running.load(Ordering::SeqCst));
        assert!(!h.recorder.mic_open.load(Ordering::SeqCst));

        // The next window starts both subsystems and stops them together.
        h.sink.hold.store(false, Ordering::SeqCst);
        h.coordinator.start().await.unwrap();
        assert!(h.recognizer.running.load(Ordering::SeqCst));
        h.coordinator.stop().await.unwrap();
        assert!(!h.recognizer.running.load(Ordering::SeqCst));
        assert!(!h.recorder.mic_open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_recognizer_start_failure_releases_recorder() {
        let h = harness(Some("whisper"), true);
        h.recognizer.fail_start.store(true, Ordering::SeqCst);

        assert!(h.coordinator.start().await.is_err());
        assert!(!h.recorder.mic_open.load(Ordering::SeqCst));
        assert_eq!(h.coordinator.state(), VoiceState::Idle);
    }

    #[tokio::test]
    async fn test_recorder_start_failure_leaves_recognizer_off() {
        let h = harness(Some("whisper"), true);
        h.recorder.fail_start.store(true, Ordering::SeqCst);

        assert!(matches!(
            h.coordinator.start().await,
            Err(VoiceError::Microphone(_))
        ));
        assert!(!h.recognizer.running.load(Ordering::SeqCst));
        assert_eq!(h.coordinator.state(), VoiceState::Idle);
    }

    #[tokio::test]
    async fn test_send_failure_still_returns_to_idle() {
        let h = harness(Some("whisper"), true);
        h.coordinator.start().await.unwrap();
        h.coordinator.on_result("hello", true);
        h.sink.fail.store(true, Ordering::SeqCst);

        assert!(matches!(h.coordinator.stop().await, Err(VoiceError::Send(_))));
        assert_eq!(h.coordinator.state(), VoiceState::Idle);
        assert!(!h.recorder.mic_open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_toggle() {
        let h = harness(Some("whisper"), true);
        assert!(h.coordinator.toggle().await.unwrap().is_none());
        assert!(h.coordinator.listening());
        assert!(h.coordinator.toggle().await.unwrap().is_some());
        assert!(!h.coordinator.listening());
        assert_eq!(h.recognizer.stops.load(Ordering::SeqCst), 1);
    }
}
