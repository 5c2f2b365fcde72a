//! Hands-free loop: listen, answer, speak, listen again
//!
//! While enabled, every final transcript is handed to a caller-supplied async
//! producer. Its answer is spoken with the automotive voice preset, and once
//! the utterance ends listening is re-armed. Disabling is honored at the next
//! checkpoint: an answer already being produced is still spoken, but no new
//! capture is started afterwards.
//!
//! A failed or slow producer costs one turn, never the loop: a short apology
//! is spoken instead and listening is re-armed as usual.

use crate::error::{Result, VoiceError};
use crate::integration::runtime::VoiceHandle;
use crate::speech::recognition::CaptureConfig;
use crate::speech::synthesis::{SpeechOptions, SpeechOutcome};
use crate::state::VoiceEvent;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

/// Future returned by a response producer
pub type ResponseFuture = BoxFuture<'static, std::result::Result<String, String>>;

/// Turns a final transcript into the text to speak back
pub type ResponseProducer = Arc<dyn Fn(String) -> ResponseFuture + Send + Sync>;

/// Configuration for the hands-free loop
#[derive(Clone, Debug)]
pub struct HandsFreeConfig {
    /// Capture config used for every re-arm (single-shot)
    pub capture: CaptureConfig,
    /// How long the producer may take before the fallback is spoken
    pub response_timeout_ms: u64,
    /// Spoken when the producer fails or times out
    pub fallback_text: String,
    /// Voice used for responses
    pub speech: SpeechOptions,
}

impl Default for HandsFreeConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            response_timeout_ms: 15_000,
            fallback_text: "Sorry, I couldn't get an answer for that. Please try again."
                .to_string(),
            speech: SpeechOptions::automotive(),
        }
    }
}

impl HandsFreeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_response_timeout_ms(mut self, timeout: u64) -> Self {
        self.response_timeout_ms = timeout;
        self
    }

    pub fn with_fallback_text(mut self, text: impl Into<String>) -> Self {
        self.fallback_text = text.into();
        self
    }

    pub fn with_speech(mut self, speech: SpeechOptions) -> Self {
        self.speech = speech;
        self
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.capture.continuous {
            return Err(VoiceError::ConfigError(
                "hands-free capture must be single-shot".to_string(),
            ));
        }
        if self.response_timeout_ms == 0 {
            return Err(VoiceError::ConfigError(
                "response_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.fallback_text.trim().is_empty() {
            return Err(VoiceError::ConfigError(
                "fallback_text must not be empty".to_string(),
            ));
        }
        self.capture.validate()
    }
}

/// Per-turn counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HandsFreeStats {
    /// Turns where the producer answered and the answer was spoken
    pub turns_completed: u64,
    /// Turns that fell back to the apology or whose speech failed
    pub turns_failed: u64,
}

enum LoopControl {
    Enable,
    Shutdown,
}

/// Cheap handle for toggling the loop, usable from inside a producer
#[derive(Clone)]
pub struct HandsFreeController {
    enabled: Arc<AtomicBool>,
    voice: VoiceHandle,
    control_tx: Sender<LoopControl>,
}

impl HandsFreeController {
    /// Enable the loop; listening is armed right away if the core is idle
    pub fn enable(&self) {
        if self.enabled.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Hands-free mode enabled");
        if let Err(e) = self.voice.set_hands_free(true) {
            warn!("Failed to record hands-free flag: {}", e);
        }
        if self.control_tx.send(LoopControl::Enable).is_err() {
            warn!("Hands-free worker is not running");
        }
    }

    /// Disable the loop; takes effect at the next checkpoint
    pub fn disable(&self) {
        if !self.enabled.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Hands-free mode disabled");
        if let Err(e) = self.voice.set_hands_free(false) {
            warn!("Failed to record hands-free flag: {}", e);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// The hands-free conversation loop
pub struct HandsFreeLoop {
    controller: HandsFreeController,
    stats: Arc<Mutex<HandsFreeStats>>,
    worker: Option<JoinHandle<()>>,
}

impl HandsFreeLoop {
    /// Start the loop's worker thread; the loop begins disabled
    pub fn new(
        voice: VoiceHandle,
        config: HandsFreeConfig,
        producer: ResponseProducer,
    ) -> Result<Self> {
        config.validate()?;

        let (control_tx, control_rx) = bounded(16);
        let enabled = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(HandsFreeStats::default()));
        // Subscribe before the thread starts so no transcript is missed
        let events = voice.subscribe();

        let worker = HandsFreeWorker {
            voice: voice.clone(),
            config,
            producer,
            enabled: Arc::clone(&enabled),
            stats: Arc::clone(&stats),
            pending_rearm: false,
        };
        let handle = thread::Builder::new()
            .name("dixon-hands-free".to_string())
            .spawn(move || worker.run(control_rx, events))
            .map_err(|e| {
                VoiceError::ChannelError(format!("Failed to spawn hands-free worker: {}", e))
            })?;

        Ok(Self {
            controller: HandsFreeController {
                enabled,
                voice,
                control_tx,
            },
            stats,
            worker: Some(handle),
        })
    }

    pub fn enable(&self) {
        self.controller.enable();
    }

    pub fn disable(&self) {
        self.controller.disable();
    }

    pub fn is_enabled(&self) -> bool {
        self.controller.is_enabled()
    }

    /// Handle for toggling the loop from elsewhere
    pub fn controller(&self) -> HandsFreeController {
        self.controller.clone()
    }

    pub fn stats(&self) -> HandsFreeStats {
        *self.stats.lock()
    }

    /// Disable the loop and stop its worker thread
    pub fn shutdown(&mut self) {
        self.controller.disable();
        let _ = self.controller.control_tx.send(LoopControl::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Hands-free worker panicked");
            }
        }
    }
}

impl Drop for HandsFreeLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct HandsFreeWorker {
    voice: VoiceHandle,
    config: HandsFreeConfig,
    producer: ResponseProducer,
    enabled: Arc<AtomicBool>,
    stats: Arc<Mutex<HandsFreeStats>>,
    /// A re-arm was refused because speech was playing
    pending_rearm: bool,
}

impl HandsFreeWorker {
    fn run(mut self, control_rx: Receiver<LoopControl>, events: Receiver<VoiceEvent>) {
        info!("Hands-free worker starting");

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to create tokio runtime: {}", e);
                let _ = self.voice.report_error(VoiceError::ConfigError(format!(
                    "Runtime creation failed: {}",
                    e
                )));
                return;
            }
        };

        loop {
            select! {
                recv(control_rx) -> msg => match msg {
                    Ok(LoopControl::Enable) => self.arm(),
                    Ok(LoopControl::Shutdown) | Err(_) => break,
                },
                recv(events) -> event => match event {
                    Ok(VoiceEvent::Transcript(result)) if result.is_final => {
                        if self.is_enabled() {
                            self.run_turn(&runtime, result.transcript_text);
                        } else {
                            debug!("Ignoring transcript: hands-free disabled");
                        }
                    }
                    // Finished, stopped and failed speech all leave `Speaking`
                    Ok(VoiceEvent::StatusChanged(status))
                        if self.pending_rearm && !status.is_speaking() => self.arm(),
                    Ok(VoiceEvent::Shutdown) | Err(_) => break,
                    Ok(_) => {}
                },
            }
        }

        info!("Hands-free worker stopped");
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// One conversational turn for a final transcript
    fn run_turn(&mut self, runtime: &Runtime, transcript: String) {
        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            debug!("Empty transcript, re-arming");
            self.arm();
            return;
        }

        info!("Hands-free turn for \"{}\"", transcript);
        let (reply, produced) = self.produce(runtime, transcript);

        let outcome = match self.voice.speak(reply, self.config.speech.clone()) {
            Ok(completion) => runtime.block_on(completion.wait()),
            Err(e) => {
                warn!("Cannot speak response: {}", e);
                SpeechOutcome::Failed(e)
            }
        };

        {
            let mut stats = self.stats.lock();
            if produced && outcome.is_completed() {
                stats.turns_completed += 1;
            } else {
                stats.turns_failed += 1;
            }
        }
        debug!("Hands-free turn finished: {:?}", outcome);

        self.arm();
    }

    /// Await the producer; returns the text to speak and whether it is a real answer
    fn produce(&self, runtime: &Runtime, transcript: String) -> (String, bool) {
        let timeout = self.config.response_timeout();
        let future = (self.producer)(transcript);

        let failure = match runtime.block_on(async { tokio::time::timeout(timeout, future).await }) {
            Ok(Ok(response)) if !response.trim().is_empty() => return (response, true),
            Ok(Ok(_)) => VoiceError::ResponseFailed("empty response".to_string()),
            Ok(Err(e)) => VoiceError::ResponseFailed(e),
            Err(_) => VoiceError::ResponseTimeout(self.config.response_timeout_ms),
        };

        warn!("Response producer failed: {}", failure);
        if let Err(e) = self.voice.report_error(failure) {
            debug!("Could not report producer failure: {}", e);
        }
        (self.config.fallback_text.clone(), false)
    }

    /// Re-arm listening if still enabled and the speaker is free
    fn arm(&mut self) {
        if !self.is_enabled() {
            debug!("Not re-arming: hands-free disabled");
            self.pending_rearm = false;
            return;
        }
        if self.voice.is_speaking() {
            debug!("Speech active, re-arm deferred");
            self.pending_rearm = true;
            return;
        }
        if self.voice.state().is_listening() {
            self.pending_rearm = false;
            return;
        }

        self.pending_rearm = false;
        if self.voice.start_listening(self.config.capture.clone()) {
            debug!("Hands-free listening re-armed");
        } else {
            warn!("Cannot re-arm listening");
        }
    }
}
