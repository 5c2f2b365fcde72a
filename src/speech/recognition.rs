//! Recognition session: one continuous or single-shot capture
//!
//! The session owns the recognition engine, tags every capture with a fresh
//! session id and turns raw engine events into `SessionUpdate`s:
//! - interim text replaces the running interim buffer
//! - final text is appended to the accumulated transcript
//! - confidence is the best final confidence of the current utterance
//!
//! Events carrying any other session id are dropped, which is what makes
//! `abort()` silent.

use crate::error::{CaptureErrorCode, Result, VoiceError};
use crate::platform::{EngineEvent, RecognitionEngine, RecognitionEvent, RecognitionSink, SessionId};
use crate::speech::probe::SupportState;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for one recognition session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Keep listening across pauses
    pub continuous: bool,
    /// Emit partial transcripts before finalization
    pub interim_results: bool,
    /// Locale tag, e.g. "en-US"
    pub language: String,
    /// Number of hypotheses requested from the engine (>= 1)
    pub max_alternatives: u32,
    /// Auto-stop after this many milliseconds (0 disables)
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            interim_results: true,
            language: "en-US".to_string(),
            max_alternatives: 1,
            timeout_ms: 10_000,
        }
    }
}

impl CaptureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set continuous mode
    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    /// Enable or disable interim results
    pub fn with_interim_results(mut self, interim: bool) -> Self {
        self.interim_results = interim;
        self
    }

    /// Set the locale tag
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the number of alternatives
    pub fn with_max_alternatives(mut self, max: u32) -> Self {
        self.max_alternatives = max;
        self
    }

    /// Set the auto-stop timeout (0 disables)
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Capture timeout, if one applies
    ///
    /// Continuous sessions never auto-stop.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_ms == 0 || self.continuous {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms))
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_alternatives == 0 {
            return Err(VoiceError::ConfigError(
                "max_alternatives must be at least 1".to_string(),
            ));
        }
        if self.language.trim().is_empty() {
            return Err(VoiceError::ConfigError("language tag is required".to_string()));
        }
        Ok(())
    }
}

/// One emitted recognition result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureResult {
    pub transcript_text: String,
    pub is_final: bool,
    /// 0-1, 0 when unknown or interim
    pub confidence_score: f32,
}

/// What the orchestrator needs to act on after an engine event
#[derive(Clone, Debug, PartialEq)]
pub enum SessionUpdate {
    /// Microphone confirmed open
    Started,
    /// A result to forward to the caller
    Result(CaptureResult),
    /// Capture failed; the session is no longer active
    Failed(CaptureErrorCode),
    /// Engine released the microphone; the session is no longer active
    Ended,
}

/// Result of a graceful stop request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was capturing
    NotActive,
    /// Stop requested; waiting for the engine to report `Ended`
    AwaitingEnd,
    /// The session is over already
    Ended,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CapturePhase {
    Capturing,
    Stopping,
}

#[derive(Debug)]
struct ActiveCapture {
    id: SessionId,
    config: CaptureConfig,
    phase: CapturePhase,
    /// A final result closed the current utterance
    utterance_closed: bool,
}

/// Accumulated transcript state
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TranscriptBuffer {
    /// Latest interim text, replaced by every interim result
    pub interim: String,
    /// Final text of every finished utterance, space separated
    pub final_text: String,
    /// Best final confidence of the current utterance
    pub confidence: f32,
}

impl TranscriptBuffer {
    fn clear(&mut self) {
        self.interim.clear();
        self.final_text.clear();
        self.confidence = 0.0;
    }

    fn append_final(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.final_text.is_empty() {
            self.final_text.push(' ');
        }
        self.final_text.push_str(text);
    }
}

/// Wraps the recognition engine for one capture at a time
pub struct RecognitionSession {
    engine: Box<dyn RecognitionEngine>,
    events_tx: Sender<EngineEvent>,
    next_id: SessionId,
    active: Option<ActiveCapture>,
    transcript: TranscriptBuffer,
}

impl RecognitionSession {
    pub fn new(engine: Box<dyn RecognitionEngine>, events_tx: Sender<EngineEvent>) -> Self {
        Self {
            engine,
            events_tx,
            next_id: 1,
            active: None,
            transcript: TranscriptBuffer::default(),
        }
    }

    /// Begin capture
    ///
    /// Returns `Ok(false)` without touching the engine when a capture is
    /// already active or `support` is negative.
    pub fn start(&mut self, config: &CaptureConfig, support: &SupportState) -> Result<bool> {
        if self.active.is_some() {
            warn!("Cannot start capture: session already active");
            return Ok(false);
        }
        if !support.is_supported {
            warn!("Cannot start capture: {}", support.reason());
            return Ok(false);
        }
        config.validate()?;

        let id = self.next_id;
        self.next_id += 1;

        let sink = RecognitionSink::new(id, self.events_tx.clone());
        self.engine.start(config, sink).map_err(|e| {
            warn!("Recognition engine failed to start: {}", e);
            VoiceError::EngineUnavailable(e)
        })?;

        self.active = Some(ActiveCapture {
            id,
            config: config.clone(),
            phase: CapturePhase::Capturing,
            utterance_closed: false,
        });
        info!(
            "Capture session {} started (continuous: {}, language: {})",
            id, config.continuous, config.language
        );
        Ok(true)
    }

    /// Graceful stop; idempotent
    pub fn stop(&mut self) -> StopOutcome {
        let Some(active) = self.active.as_mut() else {
            return StopOutcome::NotActive;
        };
        if active.phase == CapturePhase::Stopping {
            return StopOutcome::AwaitingEnd;
        }
        active.phase = CapturePhase::Stopping;
        let id = active.id;

        if let Err(e) = self.engine.stop() {
            warn!("Recognition engine failed to stop session {}: {}", id, e);
            self.detach();
            return StopOutcome::Ended;
        }

        if self.engine.confirms_end() {
            debug!("Stop requested for session {}, awaiting end", id);
            StopOutcome::AwaitingEnd
        } else {
            debug!("Session {} stopped (engine does not confirm end)", id);
            self.detach();
            StopOutcome::Ended
        }
    }

    /// Immediate termination; pending results are discarded
    pub fn abort(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = self.engine.abort() {
                debug!("Ignoring abort error for session {}: {}", active.id, e);
            }
            self.transcript.interim.clear();
            info!("Capture session {} aborted", active.id);
        }
    }

    /// Close a single-shot session after its final result
    ///
    /// The engine is asked to release the microphone; nothing it reports for
    /// this session afterwards is delivered.
    pub fn complete(&mut self) {
        if let Some(active) = self.active.take() {
            if active.phase == CapturePhase::Capturing {
                if let Err(e) = self.engine.stop() {
                    debug!("Ignoring stop error for completed session {}: {}", active.id, e);
                }
            }
            debug!("Capture session {} complete", active.id);
        }
    }

    /// Clear accumulated transcript state without touching the engine
    pub fn reset_transcript(&mut self) {
        self.transcript.clear();
    }

    /// Apply one engine event
    pub fn handle_event(
        &mut self,
        session: SessionId,
        event: RecognitionEvent,
    ) -> Option<SessionUpdate> {
        let Some(active) = self.active.as_mut() else {
            debug!("Dropping event for inactive session {}", session);
            return None;
        };
        if active.id != session {
            debug!("Dropping stale event for session {} (current {})", session, active.id);
            return None;
        }

        match event {
            RecognitionEvent::Started => Some(SessionUpdate::Started),

            RecognitionEvent::Result {
                alternatives,
                is_final,
            } => {
                if active.utterance_closed {
                    if !active.config.continuous {
                        debug!("Dropping result after final for session {}", session);
                        return None;
                    }
                    // Continuous mode: the next result opens a new utterance
                    active.utterance_closed = false;
                    self.transcript.confidence = 0.0;
                }

                let text = alternatives
                    .first()
                    .map(|alt| alt.transcript.trim().to_string())
                    .unwrap_or_default();

                if !is_final {
                    if !active.config.interim_results {
                        return None;
                    }
                    self.transcript.interim = text.clone();
                    return Some(SessionUpdate::Result(CaptureResult {
                        transcript_text: text,
                        is_final: false,
                        confidence_score: 0.0,
                    }));
                }

                let best = alternatives
                    .iter()
                    .filter_map(|alt| alt.confidence)
                    .fold(0.0_f32, f32::max)
                    .clamp(0.0, 1.0);
                self.transcript.confidence = self.transcript.confidence.max(best);
                self.transcript.interim.clear();
                self.transcript.append_final(&text);
                active.utterance_closed = true;

                Some(SessionUpdate::Result(CaptureResult {
                    transcript_text: text,
                    is_final: true,
                    confidence_score: self.transcript.confidence,
                }))
            }

            RecognitionEvent::Error(code) => {
                warn!("Capture session {} failed: {}", session, code);
                self.detach();
                Some(SessionUpdate::Failed(code))
            }

            RecognitionEvent::Ended => {
                debug!("Capture session {} ended", session);
                self.detach();
                Some(SessionUpdate::Ended)
            }
        }
    }

    fn detach(&mut self) {
        self.active = None;
        self.transcript.interim.clear();
    }

    /// Whether a capture is active (including one that is stopping)
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Whether a graceful stop is in progress
    pub fn is_stopping(&self) -> bool {
        matches!(&self.active, Some(a) if a.phase == CapturePhase::Stopping)
    }

    /// Id of the active session
    pub fn current_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Config of the active session
    pub fn active_config(&self) -> Option<&CaptureConfig> {
        self.active.as_ref().map(|a| &a.config)
    }

    /// Accumulated transcript state
    pub fn transcript(&self) -> &TranscriptBuffer {
        &self.transcript
    }
}
