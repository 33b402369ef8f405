//! Voice input state machine with thread-safe transitions.
//!
//! Enforces valid state transitions for one listening window:
//! - Idle -> Listening (microphone acquired, recognizer and recorder running)
//! - Listening -> Stopping (explicit stop, natural end, or error)
//! - Stopping -> Idle (transcript flushed, recorder finalized)

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::VoiceError;

/// Operational state of the voice input coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceState {
    /// Microphone released. Ready to start.
    Idle,
    /// Recognizer and recorder are both running.
    Listening,
    /// Tearing the pair down and flushing the transcript.
    Stopping,
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceState::Idle => write!(f, "Idle"),
            VoiceState::Listening => write!(f, "Listening"),
            VoiceState::Stopping => write!(f, "Stopping"),
        }
    }
}

impl VoiceState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &VoiceState) -> bool {
        matches!(
            (self, target),
            (VoiceState::Idle, VoiceState::Listening)
                | (VoiceState::Listening, VoiceState::Stopping)
                | (VoiceState::Stopping, VoiceState::Idle)
        )
    }
}

/// Thread-safe state machine shared by the coordinator and its callbacks.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: Arc<Mutex<VoiceState>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine initialized to `Idle`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(VoiceState::Idle)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VoiceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the current state.
    pub fn current(&self) -> VoiceState {
        *self.lock()
    }

    /// Attempt to transition to the target state.
    pub fn transition(&self, target: VoiceState) -> Result<(), VoiceError> {
        let mut state = self.lock();
        if state.can_transition_to(&target) {
            tracing::debug!("Voice state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(VoiceError::InvalidTransition {
                from: state.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Force the state machine back to Idle (used for error recovery).
    pub fn reset(&self) {
        let mut state = self.lock();
        if *state != VoiceState::Idle {
            tracing::warn!("Voice state machine reset to Idle from {}", *state);
        }
        *state = VoiceState::Idle;
    }
}
