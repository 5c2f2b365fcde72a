//! Integration layer for the voice core
//!
//! This module wires the speech components into one state machine and hosts it:
//! - `VoiceOrchestrator`: the deterministic state machine
//! - `VoiceRuntime` / `VoiceHandle`: the threaded host and its caller API
//! - `HandsFreeLoop`: listen, answer, speak, listen again

pub mod config;
pub mod hands_free;
pub mod orchestrator;
pub mod runtime;
pub mod timer;

pub use config::VoiceConfig;
pub use hands_free::{
    HandsFreeConfig, HandsFreeController, HandsFreeLoop, HandsFreeStats, ResponseFuture,
    ResponseProducer,
};
pub use orchestrator::VoiceOrchestrator;
pub use runtime::{VoiceCommand, VoiceHandle, VoiceRuntime};
pub use timer::{CaptureTimer, TimerPurpose};
