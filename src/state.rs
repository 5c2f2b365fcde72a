//! Unified voice state for the Dixon voice core
//!
//! This module provides a thread-safe shared state that can be accessed by:
//! - **Orchestrator**: the only writer, updating state as commands and engine
//!   events are processed
//! - **UI**: reads state for rendering
//! - **Hands-free loop / tests**: read state for decisions and assertions
//!
//! The design separates:
//! - **State**: shared data that can be queried synchronously
//! - **Events**: notifications for subscribers (transcripts, errors, status)

use crate::error::VoiceError;
use crate::platform::UtteranceId;
use crate::speech::probe::SupportState;
use crate::speech::recognition::CaptureResult;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The single status the voice core reports
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceStatus {
    /// Nothing capturing or playing
    #[default]
    Idle,
    /// Microphone open, no result yet
    Listening,
    /// Interim results arriving, no final yet
    Processing,
    /// An utterance is playing
    Speaking,
    /// An error was just reported; always followed by a return to idle
    Error(String),
}

impl VoiceStatus {
    /// Check if the microphone is in use
    pub fn is_capturing(&self) -> bool {
        matches!(self, VoiceStatus::Listening | VoiceStatus::Processing)
    }

    /// Check if an utterance is playing
    pub fn is_speaking(&self) -> bool {
        matches!(self, VoiceStatus::Speaking)
    }

    /// Check if idle
    pub fn is_idle(&self) -> bool {
        matches!(self, VoiceStatus::Idle)
    }

    /// Check if an error is being reported
    pub fn is_error(&self) -> bool {
        matches!(self, VoiceStatus::Error(_))
    }
}

impl std::fmt::Display for VoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceStatus::Idle => write!(f, "Idle"),
            VoiceStatus::Listening => write!(f, "Listening"),
            VoiceStatus::Processing => write!(f, "Processing"),
            VoiceStatus::Speaking => write!(f, "Speaking"),
            VoiceStatus::Error(reason) => write!(f, "Error({})", reason),
        }
    }
}

/// Last reported error
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error: VoiceError,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Voice core state
///
/// This is the single source of truth the UI renders from.
/// It can be shared across threads using `SharedVoiceState`.
#[derive(Clone, Debug, Default)]
pub struct VoiceState {
    /// Current status
    pub status: VoiceStatus,
    /// Latest interim transcript of the current utterance
    pub partial_transcript: String,
    /// Final transcript of the current capture
    pub final_transcript: String,
    /// Last result delivered to callers
    pub last_result: Option<CaptureResult>,
    /// Confidence of the last final result
    pub confidence: f32,
    /// Last reported error
    pub last_error: Option<ErrorRecord>,
    /// Recognition capability
    pub support: SupportState,
    /// Whether the hands-free loop is enabled
    pub hands_free: bool,
    /// Utterance currently playing
    pub current_utterance: Option<UtteranceId>,
}

impl VoiceState {
    /// Create a new default state
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an immutable snapshot of current state
    pub fn snapshot(&self) -> VoiceStateSnapshot {
        VoiceStateSnapshot {
            status: self.status.clone(),
            partial_transcript: self.partial_transcript.clone(),
            final_transcript: self.final_transcript.clone(),
            last_result: self.last_result.clone(),
            confidence: self.confidence,
            last_error: self.last_error.clone(),
            support: self.support.clone(),
            hands_free: self.hands_free,
        }
    }

    // === State transitions ===

    /// New capture: clear per-utterance state
    pub fn begin_capture(&mut self) {
        self.partial_transcript.clear();
        self.final_transcript.clear();
        self.last_result = None;
        self.confidence = 0.0;
    }

    /// Record an interim or final result
    pub fn record_result(&mut self, result: &CaptureResult) {
        if result.is_final {
            self.partial_transcript.clear();
            self.confidence = result.confidence_score;
            if !result.transcript_text.is_empty() {
                if !self.final_transcript.is_empty() {
                    self.final_transcript.push(' ');
                }
                self.final_transcript.push_str(&result.transcript_text);
            }
        } else {
            self.partial_transcript = result.transcript_text.clone();
        }
        self.last_result = Some(result.clone());
    }

    /// Capture over: drop any partial text
    pub fn end_capture(&mut self) {
        self.partial_transcript.clear();
    }

    /// Record an error
    pub fn record_error(&mut self, error: &VoiceError) {
        self.last_error = Some(ErrorRecord {
            error: error.clone(),
            message: error.user_message(),
            at: Utc::now(),
        });
    }

    /// Clear the last error
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }
}

/// Immutable snapshot of voice state
///
/// Serializable so a UI bridge can ship it as JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoiceStateSnapshot {
    pub status: VoiceStatus,
    pub partial_transcript: String,
    pub final_transcript: String,
    pub last_result: Option<CaptureResult>,
    pub confidence: f32,
    pub last_error: Option<ErrorRecord>,
    pub support: SupportState,
    pub hands_free: bool,
}

/// Thread-safe shared voice state
///
/// This wraps `VoiceState` in `Arc<RwLock<>>` for safe concurrent access.
#[derive(Clone, Default)]
pub struct SharedVoiceState {
    inner: Arc<RwLock<VoiceState>>,
}

impl SharedVoiceState {
    /// Create a new shared state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a read lock on the state
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, VoiceState> {
        self.inner.read()
    }

    /// Get a write lock on the state
    pub(crate) fn write(&self) -> parking_lot::RwLockWriteGuard<'_, VoiceState> {
        self.inner.write()
    }

    /// Get a snapshot of current state (no lock held after return)
    pub fn snapshot(&self) -> VoiceStateSnapshot {
        self.inner.read().snapshot()
    }

    // === Convenience read methods ===

    pub fn status(&self) -> VoiceStatus {
        self.inner.read().status.clone()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.read().status.is_idle()
    }

    pub fn is_listening(&self) -> bool {
        self.inner.read().status.is_capturing()
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.read().status.is_speaking()
    }

    pub fn partial_transcript(&self) -> String {
        self.inner.read().partial_transcript.clone()
    }

    pub fn final_transcript(&self) -> String {
        self.inner.read().final_transcript.clone()
    }

    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.inner.read().last_error.clone()
    }

    pub fn support(&self) -> SupportState {
        self.inner.read().support.clone()
    }

    pub fn is_hands_free(&self) -> bool {
        self.inner.read().hands_free
    }
}

/// Events emitted by the voice core
///
/// Subscribers use them for callbacks and UI updates. Current values should be
/// read from `SharedVoiceState` rather than reconstructed from events.
#[derive(Clone, Debug, PartialEq)]
pub enum VoiceEvent {
    /// Status changed
    StatusChanged(VoiceStatus),
    /// A recognition result, in arrival order
    Transcript(CaptureResult),
    /// An error was reported
    Error(VoiceError),
    /// An utterance started playing
    SpeechStarted(UtteranceId),
    /// An utterance played to the end
    SpeechFinished(UtteranceId),
    /// Capability detection produced a new answer
    SupportChanged(SupportState),
    /// The voice runtime has shut down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureErrorCode;

    fn result(text: &str, is_final: bool) -> CaptureResult {
        CaptureResult {
            transcript_text: text.to_string(),
            is_final,
            confidence_score: if is_final { 0.9 } else { 0.0 },
        }
    }

    #[test]
    fn test_status_predicates() {
        assert!(VoiceStatus::Listening.is_capturing());
        assert!(VoiceStatus::Processing.is_capturing());
        assert!(!VoiceStatus::Speaking.is_capturing());
        assert!(VoiceStatus::Speaking.is_speaking());
        assert!(VoiceStatus::Error("x".into()).is_error());
        assert_eq!(VoiceStatus::default(), VoiceStatus::Idle);
    }

    #[test]
    fn test_record_results() {
        let mut state = VoiceState::new();
        state.begin_capture();

        state.record_result(&result("my car", false));
        assert_eq!(state.partial_transcript, "my car");

        state.record_result(&result("my car won't start", true));
        assert!(state.partial_transcript.is_empty());
        assert_eq!(state.final_transcript, "my car won't start");
        assert_eq!(state.confidence, 0.9);

        state.begin_capture();
        assert!(state.final_transcript.is_empty());
        assert!(state.last_result.is_none());
    }

    #[test]
    fn test_record_error() {
        let mut state = VoiceState::new();
        state.record_error(&VoiceError::CaptureFailed(CaptureErrorCode::NoSpeech));

        let record = state.last_error.clone().unwrap();
        assert_eq!(record.error, VoiceError::CaptureFailed(CaptureErrorCode::NoSpeech));
        assert_eq!(record.message, "I didn't hear anything. Please try again.");

        state.clear_error();
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_shared_state() {
        let shared = SharedVoiceState::new();
        assert!(shared.is_idle());

        shared.write().status = VoiceStatus::Listening;
        assert!(shared.is_listening());
        assert!(!shared.is_idle());

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.status, VoiceStatus::Listening);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let shared = SharedVoiceState::new();
        let before = shared.snapshot();

        shared.write().status = VoiceStatus::Speaking;

        assert_eq!(before.status, VoiceStatus::Idle);
        assert_eq!(shared.snapshot().status, VoiceStatus::Speaking);
    }

    #[test]
    fn test_snapshot_serializes() {
        let shared = SharedVoiceState::new();
        shared.write().partial_transcript = "brakes are".to_string();

        let json = serde_json::to_value(shared.snapshot()).unwrap();
        assert_eq!(json["status"], "Idle");
        assert_eq!(json["partial_transcript"], "brakes are");
    }
}
