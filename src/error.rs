//! Error types for the voice core
//!
//! Every failure the core can surface is a `VoiceError`. None of them are
//! fatal: the orchestrator records the error, reports it on the event stream
//! and returns to `Idle`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The exclusive device activity that blocked a request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activity {
    /// The microphone is capturing
    Listening,
    /// The speaker is playing an utterance
    Speaking,
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activity::Listening => write!(f, "listening"),
            Activity::Speaking => write!(f, "speaking"),
        }
    }
}

/// Normalized sub-code for capture failures
///
/// Platform recognizers report errors as free-form codes; they are folded into
/// this closed set so callers only ever match on one shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureErrorCode {
    /// The engine heard nothing before giving up
    NoSpeech,
    /// The microphone could not be opened or failed mid-capture
    AudioCapture,
    /// A server-backed engine lost its connection
    Network,
    /// The user or OS refused microphone access
    PermissionDenied,
    /// The engine aborted the capture on its own
    Aborted,
    /// The requested locale is not available on this engine
    LanguageNotSupported,
    /// Anything the platform reports that has no better match
    Other,
}

impl CaptureErrorCode {
    /// Map a raw platform error code onto the normalized set
    pub fn from_platform(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "no-speech" | "no_speech" | "nospeech" => CaptureErrorCode::NoSpeech,
            "audio-capture" | "audio_capture" | "audio" => CaptureErrorCode::AudioCapture,
            "network" | "network-error" => CaptureErrorCode::Network,
            "not-allowed" | "service-not-allowed" | "permission-denied" | "permissions" => {
                CaptureErrorCode::PermissionDenied
            }
            "aborted" => CaptureErrorCode::Aborted,
            "language-not-supported" => CaptureErrorCode::LanguageNotSupported,
            _ => CaptureErrorCode::Other,
        }
    }

    /// Stable, human-readable code
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureErrorCode::NoSpeech => "no-speech",
            CaptureErrorCode::AudioCapture => "audio-capture",
            CaptureErrorCode::Network => "network",
            CaptureErrorCode::PermissionDenied => "permission-denied",
            CaptureErrorCode::Aborted => "aborted",
            CaptureErrorCode::LanguageNotSupported => "language-not-supported",
            CaptureErrorCode::Other => "other",
        }
    }
}

impl std::fmt::Display for CaptureErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voice core errors
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VoiceError {
    /// No recognition engine is usable in this environment
    #[error("Speech recognition not supported: {0}")]
    NotSupported(String),

    /// The microphone or speaker is already in use
    #[error("Voice core is already {0}")]
    AlreadyActive(Activity),

    /// The platform engine failed to initialize
    #[error("Speech engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Capture ended with an engine error
    #[error("Speech capture failed: {0}")]
    CaptureFailed(CaptureErrorCode),

    /// Speech output failed
    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    /// A request was malformed (empty text, out-of-range values)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Channel communication error between the caller and the voice runtime
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The hands-free response producer failed
    #[error("Response producer failed: {0}")]
    ResponseFailed(String),

    /// The hands-free response producer did not answer in time
    #[error("Response producer timed out after {0} ms")]
    ResponseTimeout(u64),
}

impl VoiceError {
    /// Check if this error is recoverable
    ///
    /// Recoverable errors can be retried immediately; the others need the user
    /// or the host application to change something first.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // No engine will not appear by retrying
            VoiceError::NotSupported(_) => false,
            // Wait for the current activity to end
            VoiceError::AlreadyActive(_) => true,
            VoiceError::EngineUnavailable(_) => true,
            VoiceError::CaptureFailed(code) => !matches!(
                code,
                CaptureErrorCode::PermissionDenied | CaptureErrorCode::LanguageNotSupported
            ),
            VoiceError::SynthesisFailed(_) => true,
            VoiceError::InvalidRequest(_) => false,
            VoiceError::ConfigError(_) => false,
            // The runtime thread is gone
            VoiceError::ChannelError(_) => false,
            VoiceError::ResponseFailed(_) => true,
            VoiceError::ResponseTimeout(_) => true,
        }
    }

    /// Get a user-friendly description of the error
    ///
    /// Returns a message suitable for display in the UI.
    pub fn user_message(&self) -> String {
        match self {
            VoiceError::NotSupported(_) => {
                "Voice input isn't available on this device.".to_string()
            }
            VoiceError::AlreadyActive(Activity::Listening) => {
                "Already listening. Finish speaking or tap stop first.".to_string()
            }
            VoiceError::AlreadyActive(Activity::Speaking) => {
                "Please wait until Dixon finishes speaking.".to_string()
            }
            VoiceError::EngineUnavailable(_) => {
                "The speech engine couldn't start. Please try again.".to_string()
            }
            VoiceError::CaptureFailed(CaptureErrorCode::NoSpeech) => {
                "I didn't hear anything. Please try again.".to_string()
            }
            VoiceError::CaptureFailed(CaptureErrorCode::PermissionDenied) => {
                "Microphone access is blocked. Please allow it in settings.".to_string()
            }
            VoiceError::CaptureFailed(CaptureErrorCode::Network) => {
                "Speech recognition lost its connection. Please try again.".to_string()
            }
            VoiceError::CaptureFailed(_) => {
                "Speech recognition failed. Please try again.".to_string()
            }
            VoiceError::SynthesisFailed(_) => {
                "Spoken playback failed. The response is shown as text.".to_string()
            }
            VoiceError::InvalidRequest(_) => "That request couldn't be processed.".to_string(),
            VoiceError::ConfigError(_) => {
                "Voice configuration error. Please check settings.".to_string()
            }
            VoiceError::ChannelError(_) => {
                "Internal communication error. Please restart voice mode.".to_string()
            }
            VoiceError::ResponseFailed(_) | VoiceError::ResponseTimeout(_) => {
                "Dixon couldn't come up with an answer. Please try again.".to_string()
            }
        }
    }
}

/// Result type alias for voice core operations
pub type Result<T> = std::result::Result<T, VoiceError>;
