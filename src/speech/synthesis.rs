//! Synthesis channel: text to speech with interrupt-and-replace
//!
//! Only one utterance plays at a time. Starting a new one cancels the current
//! one first, and completion events for anything but the current utterance
//! are dropped, so a replaced utterance never reports done or failed.

use crate::error::{Result, VoiceError};
use crate::platform::{EngineEvent, SynthesisEngine, SynthesisEvent, SynthesisSink, UtteranceId};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default pitch multiplier
pub const DEFAULT_PITCH: f32 = 1.0;
/// Default speaking rate
pub const DEFAULT_RATE: f32 = 0.9;
/// Default volume
pub const DEFAULT_VOLUME: f32 = 0.8;

/// Automotive preset: pitch raised 10%
pub const AUTOMOTIVE_PITCH_FACTOR: f32 = 1.1;
/// Automotive preset: rate slowed 20%
pub const AUTOMOTIVE_RATE_FACTOR: f32 = 0.8;
/// Automotive preset: volume maximized
pub const AUTOMOTIVE_VOLUME: f32 = 1.0;

const PITCH_RANGE: (f32, f32) = (0.5, 2.0);
const RATE_RANGE: (f32, f32) = (0.1, 2.0);

/// Caller-facing speech options
///
/// Every field is an override; unset fields fall back to the defaults, or to
/// the automotive preset when `automotive` is set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechOptions {
    pub pitch: Option<f32>,
    pub rate: Option<f32>,
    pub volume: Option<f32>,
    pub language: Option<String>,
    pub voice: Option<String>,
    /// Tune defaults for road noise
    pub automotive: bool,
}

impl SpeechOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with the automotive preset enabled
    pub fn automotive() -> Self {
        Self {
            automotive: true,
            ..Default::default()
        }
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_automotive(mut self, automotive: bool) -> Self {
        self.automotive = automotive;
        self
    }

    /// Resolve overrides and preset into concrete parameters
    pub fn resolve(&self) -> VoiceParams {
        let (pitch, rate, volume) = if self.automotive {
            (
                DEFAULT_PITCH * AUTOMOTIVE_PITCH_FACTOR,
                DEFAULT_RATE * AUTOMOTIVE_RATE_FACTOR,
                AUTOMOTIVE_VOLUME,
            )
        } else {
            (DEFAULT_PITCH, DEFAULT_RATE, DEFAULT_VOLUME)
        };

        VoiceParams {
            pitch: self.pitch.unwrap_or(pitch).clamp(PITCH_RANGE.0, PITCH_RANGE.1),
            rate: self.rate.unwrap_or(rate).clamp(RATE_RANGE.0, RATE_RANGE.1),
            volume: self.volume.unwrap_or(volume).clamp(0.0, 1.0),
            language: self.language.clone(),
            voice: self.voice.clone(),
        }
    }
}

/// Concrete parameters handed to the engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub pitch: f32,
    pub rate: f32,
    pub volume: f32,
    pub language: Option<String>,
    pub voice: Option<String>,
}

impl Default for VoiceParams {
    fn default() -> Self {
        SpeechOptions::default().resolve()
    }
}

/// One utterance ready for the engine
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechRequest {
    pub id: UtteranceId,
    pub text: String,
    pub params: VoiceParams,
}

impl SpeechRequest {
    /// Build a request, rejecting text that is empty after normalization
    pub fn new(text: &str, options: &SpeechOptions) -> Result<Self> {
        let text = normalize_text_for_speech(text);
        if text.is_empty() {
            return Err(VoiceError::InvalidRequest(
                "speech text must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            text,
            params: options.resolve(),
        })
    }
}

/// How an utterance ended, from the caller's point of view
#[derive(Clone, Debug, PartialEq)]
pub enum SpeechOutcome {
    /// Played to the end
    Completed,
    /// Replaced by a newer utterance, stopped, or torn down
    Interrupted,
    /// The engine failed
    Failed(VoiceError),
}

impl SpeechOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SpeechOutcome::Completed)
    }
}

/// Completion signal for one `speak` call
#[derive(Debug)]
pub struct SpeechCompletion {
    id: UtteranceId,
    rx: oneshot::Receiver<SpeechOutcome>,
}

impl SpeechCompletion {
    /// Create a completion and the sender that resolves it
    pub(crate) fn channel(id: UtteranceId) -> (oneshot::Sender<SpeechOutcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { id, rx })
    }

    pub fn id(&self) -> UtteranceId {
        self.id
    }

    /// Wait for the utterance to end
    pub async fn wait(self) -> SpeechOutcome {
        self.rx.await.unwrap_or(SpeechOutcome::Interrupted)
    }

    /// Blocking wait, for callers outside an async runtime
    pub fn wait_blocking(self) -> SpeechOutcome {
        self.rx.blocking_recv().unwrap_or(SpeechOutcome::Interrupted)
    }

    /// Outcome if already resolved
    pub fn try_outcome(&mut self) -> Option<SpeechOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(SpeechOutcome::Interrupted),
        }
    }
}

/// Update produced by a synthesis engine event
#[derive(Clone, Debug, PartialEq)]
pub enum SynthesisUpdate {
    Started(UtteranceId),
    Finished(UtteranceId),
    Failed(UtteranceId, String),
}

/// Owns the synthesis engine and the current utterance
pub struct SynthesisChannel {
    engine: Box<dyn SynthesisEngine>,
    events_tx: Sender<EngineEvent>,
    current: Option<UtteranceId>,
}

impl SynthesisChannel {
    pub fn new(engine: Box<dyn SynthesisEngine>, events_tx: Sender<EngineEvent>) -> Self {
        Self {
            engine,
            events_tx,
            current: None,
        }
    }

    /// Start an utterance, cancelling the current one first
    pub fn speak(&mut self, request: SpeechRequest) -> Result<UtteranceId> {
        if let Some(previous) = self.current.take() {
            debug!("Interrupting utterance {} for {}", previous, request.id);
            if let Err(e) = self.engine.cancel() {
                warn!("Failed to cancel utterance {}: {}", previous, e);
            }
        }

        let sink = SynthesisSink::new(request.id, self.events_tx.clone());
        self.engine
            .speak(&request.text, &request.params, sink)
            .map_err(|e| {
                warn!("Synthesis engine rejected utterance {}: {}", request.id, e);
                VoiceError::SynthesisFailed(e)
            })?;

        info!(
            "Speaking utterance {} ({} chars, pitch {:.2}, rate {:.2}, volume {:.2})",
            request.id,
            request.text.len(),
            request.params.pitch,
            request.params.rate,
            request.params.volume
        );
        self.current = Some(request.id);
        Ok(request.id)
    }

    /// Cancel the current utterance; safe when idle
    pub fn stop(&mut self) -> Option<UtteranceId> {
        let current = self.current.take()?;
        if let Err(e) = self.engine.cancel() {
            debug!("Ignoring cancel error for utterance {}: {}", current, e);
        }
        debug!("Utterance {} cancelled", current);
        Some(current)
    }

    /// Apply one engine event
    pub fn handle_event(
        &mut self,
        utterance: UtteranceId,
        event: SynthesisEvent,
    ) -> Option<SynthesisUpdate> {
        if self.current != Some(utterance) {
            debug!("Dropping event for stale utterance {}", utterance);
            return None;
        }

        match event {
            SynthesisEvent::Started => Some(SynthesisUpdate::Started(utterance)),
            SynthesisEvent::Finished => {
                self.current = None;
                Some(SynthesisUpdate::Finished(utterance))
            }
            SynthesisEvent::Failed(error) => {
                self.current = None;
                Some(SynthesisUpdate::Failed(utterance, error))
            }
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<UtteranceId> {
        self.current
    }
}

/// Spoken forms for abbreviations common in repair conversations
const SPOKEN_FORMS: &[(&str, &str)] = &[
    ("approx.", "approximately"),
    ("hrs", "hours"),
    ("hrs.", "hours"),
    ("min.", "minutes"),
    ("mins", "minutes"),
    ("mi.", "miles"),
    ("km", "kilometers"),
    ("mph", "miles per hour"),
    ("mpg", "miles per gallon"),
    ("psi", "P S I"),
    ("rpm", "R P M"),
    ("obd", "O B D"),
    ("obd-ii", "O B D two"),
    ("vin", "V I N"),
    ("abs", "A B S"),
    ("qt", "quarts"),
    ("qts", "quarts"),
    ("vs.", "versus"),
    ("e.g.", "for example"),
    ("etc.", "etcetera"),
    ("&", "and"),
];

/// Normalize text for speech output
///
/// Expands repair-shop abbreviations word by word, spells out currency and
/// percent signs, and collapses whitespace.
pub fn normalize_text_for_speech(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let lower = word.to_ascii_lowercase();
            if let Some((_, spoken)) = SPOKEN_FORMS.iter().find(|(abbrev, _)| *abbrev == lower) {
                return spoken.to_string();
            }
            if let Some(amount) = word.strip_prefix('$') {
                if !amount.is_empty() {
                    return format!("{} dollars", amount.trim_end_matches(['.', ',']));
                }
            }
            if let Some(value) = word.strip_suffix('%') {
                if !value.is_empty() {
                    return format!("{} percent", value);
                }
            }
            word.to_string()
        })
        .collect::<Vec<_>>()
        .join(" ")
}
