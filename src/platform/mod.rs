//! Platform seam for the native speech engines
//!
//! The real recognizer and synthesizer live outside this crate. They are
//! reached through three traits:
//! - `SpeechPlatform`: capability queries used by the probe
//! - `RecognitionEngine`: microphone capture and speech-to-text
//! - `SynthesisEngine`: text-to-speech output
//!
//! Engine calls only initiate work. Everything that happens afterwards is
//! reported as an `EngineEvent` through the sink handed to the engine, and
//! the orchestrator consumes those events one at a time.

pub mod simulated;

use crate::error::CaptureErrorCode;
use crate::speech::recognition::CaptureConfig;
use crate::speech::synthesis::VoiceParams;
use crossbeam_channel::Sender;
use uuid::Uuid;

/// Identifier of one recognition session (one `start` call)
pub type SessionId = u64;

/// Identifier of one synthesized utterance
pub type UtteranceId = Uuid;

/// Microphone permission as reported by the platform
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PermissionState {
    /// Access granted
    Granted,
    /// Access refused by the user or policy
    Denied,
    /// Not asked yet; the engine prompts on first start
    #[default]
    Undetermined,
}

/// Raw capability report from the platform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Whether the host environment finished initializing
    pub environment_ready: bool,
    /// Whether a recognition engine exists at all
    pub recognition_available: bool,
    /// Microphone permission
    pub permission: PermissionState,
}

impl PlatformCapabilities {
    /// A fully usable platform
    pub fn ready() -> Self {
        Self {
            environment_ready: true,
            recognition_available: true,
            permission: PermissionState::Granted,
        }
    }
}

/// Capability queries against the host platform
pub trait SpeechPlatform: Send {
    /// Query the current capabilities
    ///
    /// An `Err` means the environment needed to answer could not be reached.
    fn query(&self) -> std::result::Result<PlatformCapabilities, String>;
}

/// One recognition hypothesis
#[derive(Clone, Debug, PartialEq)]
pub struct Alternative {
    /// Hypothesis text
    pub transcript: String,
    /// Engine confidence (0-1), `None` when the engine does not report it
    pub confidence: Option<f32>,
}

impl Alternative {
    pub fn new(transcript: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            transcript: transcript.into(),
            confidence,
        }
    }
}

/// Events a recognition engine reports for a session
#[derive(Clone, Debug, PartialEq)]
pub enum RecognitionEvent {
    /// The microphone is actually capturing
    Started,
    /// A result, ranked alternatives first-best first
    Result {
        alternatives: Vec<Alternative>,
        is_final: bool,
    },
    /// The capture failed
    Error(CaptureErrorCode),
    /// The engine released the microphone
    Ended,
}

impl RecognitionEvent {
    /// Interim result with a single alternative and no confidence
    pub fn interim(text: impl Into<String>) -> Self {
        RecognitionEvent::Result {
            alternatives: vec![Alternative::new(text, None)],
            is_final: false,
        }
    }

    /// Final result with a single alternative
    pub fn final_result(text: impl Into<String>, confidence: f32) -> Self {
        RecognitionEvent::Result {
            alternatives: vec![Alternative::new(text, Some(confidence))],
            is_final: true,
        }
    }
}

/// Events a synthesis engine reports for an utterance
#[derive(Clone, Debug, PartialEq)]
pub enum SynthesisEvent {
    /// Audio started playing
    Started,
    /// The utterance played to the end
    Finished,
    /// Output failed
    Failed(String),
}

/// Tagged engine event as seen by the orchestrator
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Recognition {
        session: SessionId,
        event: RecognitionEvent,
    },
    Synthesis {
        utterance: UtteranceId,
        event: SynthesisEvent,
    },
}

/// Event sink handed to a recognition engine for one session
#[derive(Clone, Debug)]
pub struct RecognitionSink {
    session: SessionId,
    tx: Sender<EngineEvent>,
}

impl RecognitionSink {
    pub(crate) fn new(session: SessionId, tx: Sender<EngineEvent>) -> Self {
        Self { session, tx }
    }

    /// Session this sink reports for
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Report an event; returns false once the core has shut down
    pub fn emit(&self, event: RecognitionEvent) -> bool {
        self.tx
            .send(EngineEvent::Recognition {
                session: self.session,
                event,
            })
            .is_ok()
    }

    pub fn started(&self) -> bool {
        self.emit(RecognitionEvent::Started)
    }

    pub fn interim(&self, text: impl Into<String>) -> bool {
        self.emit(RecognitionEvent::interim(text))
    }

    pub fn final_result(&self, text: impl Into<String>, confidence: f32) -> bool {
        self.emit(RecognitionEvent::final_result(text, confidence))
    }

    pub fn error(&self, code: CaptureErrorCode) -> bool {
        self.emit(RecognitionEvent::Error(code))
    }

    pub fn ended(&self) -> bool {
        self.emit(RecognitionEvent::Ended)
    }
}

/// Event sink handed to a synthesis engine for one utterance
#[derive(Clone, Debug)]
pub struct SynthesisSink {
    utterance: UtteranceId,
    tx: Sender<EngineEvent>,
}

impl SynthesisSink {
    pub(crate) fn new(utterance: UtteranceId, tx: Sender<EngineEvent>) -> Self {
        Self { utterance, tx }
    }

    /// Utterance this sink reports for
    pub fn utterance(&self) -> UtteranceId {
        self.utterance
    }

    pub fn emit(&self, event: SynthesisEvent) -> bool {
        self.tx
            .send(EngineEvent::Synthesis {
                utterance: self.utterance,
                event,
            })
            .is_ok()
    }

    pub fn started(&self) -> bool {
        self.emit(SynthesisEvent::Started)
    }

    pub fn finished(&self) -> bool {
        self.emit(SynthesisEvent::Finished)
    }

    pub fn failed(&self, error: impl Into<String>) -> bool {
        self.emit(SynthesisEvent::Failed(error.into()))
    }
}

/// Native speech-to-text engine
pub trait RecognitionEngine: Send {
    /// Begin capturing with `config`, reporting through `sink`
    fn start(
        &mut self,
        config: &CaptureConfig,
        sink: RecognitionSink,
    ) -> std::result::Result<(), String>;

    /// Graceful stop: deliver any pending final result, then `Ended`
    fn stop(&mut self) -> std::result::Result<(), String>;

    /// Immediate stop; pending results may be dropped
    fn abort(&mut self) -> std::result::Result<(), String>;

    /// Whether the engine reports `Ended` after `stop`
    ///
    /// Engines that return false are considered stopped as soon as `stop`
    /// returns.
    fn confirms_end(&self) -> bool {
        true
    }
}

/// Native text-to-speech engine
pub trait SynthesisEngine: Send {
    /// Start speaking `text`, reporting through `sink`
    fn speak(
        &mut self,
        text: &str,
        params: &VoiceParams,
        sink: SynthesisSink,
    ) -> std::result::Result<(), String>;

    /// Cancel whatever is currently playing
    fn cancel(&mut self) -> std::result::Result<(), String>;
}

/// The three platform pieces the orchestrator needs
pub struct VoicePlatform {
    pub probe: Box<dyn SpeechPlatform>,
    pub recognizer: Box<dyn RecognitionEngine>,
    pub synthesizer: Box<dyn SynthesisEngine>,
}

impl VoicePlatform {
    pub fn new(
        probe: impl SpeechPlatform + 'static,
        recognizer: impl RecognitionEngine + 'static,
        synthesizer: impl SynthesisEngine + 'static,
    ) -> Self {
        Self {
            probe: Box::new(probe),
            recognizer: Box::new(recognizer),
            synthesizer: Box::new(synthesizer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_recognition_sink_tags_session() {
        let (tx, rx) = unbounded();
        let sink = RecognitionSink::new(7, tx);

        assert!(sink.interim("my car"));
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::Recognition {
                session: 7,
                event: RecognitionEvent::interim("my car"),
            }
        );
    }

    #[test]
    fn test_sink_reports_closed_channel() {
        let (tx, rx) = unbounded();
        let sink = SynthesisSink::new(Uuid::new_v4(), tx);
        drop(rx);
        assert!(!sink.finished());
    }
}
