//! The orchestrator's single capture timer
//!
//! At most one deadline is armed at any time. Arming replaces the previous
//! deadline, and every terminal capture event cancels it. A deadline is bound
//! to the session it was armed for, so a late fire can be recognized and
//! ignored.

use crate::platform::SessionId;
use std::time::Instant;
use tracing::debug;

/// What the armed deadline is for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerPurpose {
    /// Force a graceful stop after `timeout_ms` of capture
    CaptureTimeout,
    /// Give up waiting for the engine to confirm a stop
    StopGrace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Armed {
    purpose: TimerPurpose,
    session: SessionId,
    deadline: Instant,
}

/// Single-slot deadline owned by the orchestrator
#[derive(Debug, Default)]
pub struct CaptureTimer {
    armed: Option<Armed>,
}

impl CaptureTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a deadline, replacing any armed one
    pub fn arm(&mut self, purpose: TimerPurpose, session: SessionId, deadline: Instant) {
        if let Some(previous) = self.armed {
            debug!("Replacing {:?} timer for session {}", previous.purpose, previous.session);
        }
        self.armed = Some(Armed {
            purpose,
            session,
            deadline,
        });
    }

    /// Clear the armed deadline, returning what it was for
    pub fn cancel(&mut self) -> Option<TimerPurpose> {
        self.armed.take().map(|armed| {
            debug!("{:?} timer for session {} cleared", armed.purpose, armed.session);
            armed.purpose
        })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.armed.map(|a| a.deadline)
    }

    pub fn purpose(&self) -> Option<TimerPurpose> {
        self.armed.map(|a| a.purpose)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Take the deadline if it has expired
    pub fn poll(&mut self, now: Instant) -> Option<(TimerPurpose, SessionId)> {
        match self.armed {
            Some(armed) if now >= armed.deadline => {
                self.armed = None;
                Some((armed.purpose, armed.session))
            }
            _ => None,
        }
    }
}
