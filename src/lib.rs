//! Voice interaction core for the Dixon automotive-repair assistant
//!
//! Speech capture, spoken output and a hands-free conversation loop behind one
//! state machine. The native engines are reached through the traits in
//! [`platform`]; [`platform::simulated`] provides scriptable stand-ins.

pub mod error;
pub mod integration;
pub mod platform;
pub mod speech;
pub mod state;
pub mod utils;

pub use error::{Activity, CaptureErrorCode, Result, VoiceError};
pub use integration::{
    HandsFreeConfig, HandsFreeController, HandsFreeLoop, HandsFreeStats, ResponseFuture,
    ResponseProducer, VoiceConfig, VoiceHandle, VoiceOrchestrator, VoiceRuntime,
};
pub use platform::VoicePlatform;
pub use speech::{
    CaptureConfig, CaptureResult, SpeechCompletion, SpeechOptions, SpeechOutcome, SupportState,
};
pub use state::{SharedVoiceState, VoiceEvent, VoiceStateSnapshot, VoiceStatus};
