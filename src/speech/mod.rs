//! Speech modules for capture and output
//!
//! This module provides:
//! - Capability detection for speech recognition
//! - Recognition sessions (speech-to-text)
//! - The synthesis channel (text-to-speech)

pub mod probe;
pub mod recognition;
pub mod synthesis;

// Re-export commonly used types
pub use probe::{CapabilityProbe, SupportState};
pub use recognition::{CaptureConfig, CaptureResult, RecognitionSession, SessionUpdate, StopOutcome};
pub use synthesis::{
    normalize_text_for_speech, SpeechCompletion, SpeechOptions, SpeechOutcome, SpeechRequest,
    SynthesisChannel, SynthesisUpdate, VoiceParams,
};
