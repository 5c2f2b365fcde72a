//! Capability probe for speech recognition
//!
//! Decides whether recognition may be attempted at all. The result is
//! memoized; the orchestrator re-runs detection exactly once, shortly after
//! attaching, because host readiness can lag the first check.

use crate::platform::{PermissionState, PlatformCapabilities, SpeechPlatform};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of capability detection
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportState {
    /// Recognition can be attempted
    pub is_supported: bool,
    /// The environment is still coming up; a later check may succeed
    pub is_initializing: bool,
    /// Why recognition is not supported
    pub diagnostic: Option<String>,
}

impl SupportState {
    pub fn supported() -> Self {
        Self {
            is_supported: true,
            is_initializing: false,
            diagnostic: None,
        }
    }

    pub fn unsupported(diagnostic: impl Into<String>) -> Self {
        Self {
            is_supported: false,
            is_initializing: false,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn initializing(diagnostic: impl Into<String>) -> Self {
        Self {
            is_supported: false,
            is_initializing: true,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Diagnostic text, with a generic fallback
    pub fn reason(&self) -> String {
        self.diagnostic
            .clone()
            .unwrap_or_else(|| "speech recognition unavailable".to_string())
    }
}

/// Evaluate a raw platform report
fn evaluate(report: std::result::Result<PlatformCapabilities, String>) -> SupportState {
    let caps = match report {
        Ok(caps) => caps,
        Err(e) => return SupportState::unsupported(format!("speech environment unavailable: {}", e)),
    };

    if !caps.environment_ready {
        return SupportState::initializing("speech environment is not ready yet");
    }
    if !caps.recognition_available {
        return SupportState::unsupported("no speech recognition engine on this platform");
    }
    if caps.permission == PermissionState::Denied {
        return SupportState::unsupported("microphone permission denied");
    }

    SupportState::supported()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Recheck {
    NotScheduled,
    Pending(Instant),
    Done,
}

/// Memoizing capability probe
pub struct CapabilityProbe {
    platform: Box<dyn SpeechPlatform>,
    memo: Option<SupportState>,
    recheck: Recheck,
}

impl CapabilityProbe {
    pub fn new(platform: Box<dyn SpeechPlatform>) -> Self {
        Self {
            platform,
            memo: None,
            recheck: Recheck::NotScheduled,
        }
    }

    /// Current support state, computing it on first use
    pub fn detect(&mut self) -> SupportState {
        if let Some(state) = &self.memo {
            return state.clone();
        }

        let state = evaluate(self.platform.query());
        if state.is_supported {
            debug!("Speech recognition supported");
        } else {
            warn!("Speech recognition not supported: {}", state.reason());
        }
        self.memo = Some(state.clone());
        state
    }

    /// Drop the memoized result; the next `detect` queries the platform again
    pub fn invalidate(&mut self) {
        self.memo = None;
    }

    /// Memoized state without querying
    pub fn current(&self) -> Option<&SupportState> {
        self.memo.as_ref()
    }

    /// Fresh detection for a newly attached environment
    ///
    /// Schedules the single follow-up check `recheck_delay` later; a zero
    /// delay disables it.
    pub fn attach(&mut self, now: Instant, recheck_delay: Duration) -> SupportState {
        self.invalidate();
        let state = self.detect();
        self.recheck = if recheck_delay.is_zero() {
            Recheck::Done
        } else {
            Recheck::Pending(now + recheck_delay)
        };
        info!(
            "Capability probe attached (supported: {}, recheck in {:?})",
            state.is_supported, recheck_delay
        );
        state
    }

    /// When the follow-up check is due, if still pending
    pub fn recheck_deadline(&self) -> Option<Instant> {
        match self.recheck {
            Recheck::Pending(deadline) => Some(deadline),
            _ => None,
        }
    }

    /// Run the follow-up check if it is due
    ///
    /// Returns the refreshed state the one time the check fires.
    pub fn poll_recheck(&mut self, now: Instant) -> Option<SupportState> {
        match self.recheck {
            Recheck::Pending(deadline) if now >= deadline => {
                self.recheck = Recheck::Done;
                self.invalidate();
                let state = self.detect();
                debug!("Capability re-check complete (supported: {})", state.is_supported);
                Some(state)
            }
            _ => None,
        }
    }
}
