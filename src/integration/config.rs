//! Configuration for the voice core
//!
//! Provides centralized configuration for the orchestrator and its runtime.

use crate::error::{Result, VoiceError};
use crate::speech::recognition::CaptureConfig;
use std::time::Duration;

/// Configuration for the voice orchestrator
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceConfig {
    /// Capture config used when a caller does not pass one
    pub capture: CaptureConfig,

    /// Capacity of the command channel; also the subscriber backlog that is
    /// logged as lagging
    pub channel_buffer_size: usize,

    /// How long `shutdown_and_wait` waits for the runtime thread
    pub shutdown_timeout_ms: u64,

    /// Delay of the one follow-up capability check (0 disables it)
    pub probe_recheck_delay_ms: u64,

    /// How long to wait for the engine to confirm a stop before aborting
    pub stop_grace_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            channel_buffer_size: 100,
            shutdown_timeout_ms: 5000,
            probe_recheck_delay_ms: 1000,
            stop_grace_ms: 1500,
        }
    }
}

impl VoiceConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default capture configuration
    pub fn with_capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    /// Set the channel buffer size
    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    /// Set the shutdown timeout
    pub fn with_shutdown_timeout_ms(mut self, timeout: u64) -> Self {
        self.shutdown_timeout_ms = timeout;
        self
    }

    /// Set the capability re-check delay
    pub fn with_probe_recheck_delay_ms(mut self, delay: u64) -> Self {
        self.probe_recheck_delay_ms = delay;
        self
    }

    /// Set the stop confirmation grace period
    pub fn with_stop_grace_ms(mut self, grace: u64) -> Self {
        self.stop_grace_ms = grace;
        self
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn probe_recheck_delay(&self) -> Duration {
        Duration::from_millis(self.probe_recheck_delay_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.channel_buffer_size == 0 {
            return Err(VoiceError::ConfigError(
                "channel_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.stop_grace_ms == 0 {
            return Err(VoiceError::ConfigError(
                "stop_grace_ms must be greater than 0".to_string(),
            ));
        }
        self.capture.validate()
    }
}
