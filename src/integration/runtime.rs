//! Threaded host for the voice orchestrator
//!
//! `VoiceRuntime` owns the orchestrator on one worker thread. The thread
//! `select!`s over caller commands, engine events and the nearest deadline,
//! so each command or event is fully processed before the next is taken.
//! `VoiceHandle` is the caller-facing API; it can be cloned freely and used
//! from any thread.

use crate::error::{Result, VoiceError};
use crate::integration::config::VoiceConfig;
use crate::integration::orchestrator::VoiceOrchestrator;
use crate::platform::VoicePlatform;
use crate::speech::recognition::CaptureConfig;
use crate::speech::synthesis::{SpeechCompletion, SpeechOptions};
use crate::state::{SharedVoiceState, VoiceEvent, VoiceStateSnapshot, VoiceStatus};
use crate::utils::channels::EventBus;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Longest the loop sleeps when no deadline is armed
const IDLE_TICK: Duration = Duration::from_millis(250);

/// Commands accepted by the runtime thread
#[derive(Debug)]
pub enum VoiceCommand {
    /// Begin capture; the reply carries the `start_listening` result
    StartListening {
        config: CaptureConfig,
        reply: Sender<bool>,
    },
    /// Graceful stop of the current capture
    StopListening,
    /// Speak text; the reply carries the completion or the rejection
    Speak {
        text: String,
        options: SpeechOptions,
        reply: Sender<Result<SpeechCompletion>>,
    },
    /// Cancel the current utterance
    StopSpeaking,
    /// Mirror the hands-free flag into the shared state
    SetHandsFree(bool),
    /// Surface an error raised outside the core
    ReportError(VoiceError),
    /// Tear down and exit the loop
    Shutdown,
}

/// Owns the orchestrator until `start` moves it onto its thread
pub struct VoiceRuntime {
    orchestrator: VoiceOrchestrator,
    command_rx: Receiver<VoiceCommand>,
}

impl VoiceRuntime {
    /// Create a runtime and its handle
    pub fn new(config: VoiceConfig, platform: VoicePlatform) -> Result<(Self, VoiceHandle)> {
        let (command_tx, command_rx) = bounded(config.channel_buffer_size);
        let orchestrator = VoiceOrchestrator::new(config.clone(), platform)?;

        let handle = VoiceHandle {
            command_tx,
            state: orchestrator.state(),
            events: orchestrator.events(),
            default_capture: config.capture.clone(),
            shutdown_timeout: config.shutdown_timeout(),
        };

        Ok((
            Self {
                orchestrator,
                command_rx,
            },
            handle,
        ))
    }

    /// Spawn the runtime thread
    pub fn start(self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("dixon-voice".to_string())
            .spawn(move || self.run())
            .map_err(|e| VoiceError::ChannelError(format!("Failed to spawn voice runtime: {}", e)))
    }

    fn run(mut self) {
        info!("Voice runtime starting");
        let engine_rx = self.orchestrator.engine_events();
        let command_rx = self.command_rx.clone();
        let events = self.orchestrator.events();

        self.orchestrator.attach(Instant::now());

        loop {
            let wait = self
                .orchestrator
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_TICK)
                .min(IDLE_TICK);

            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(VoiceCommand::Shutdown) => {
                        info!("Shutdown requested");
                        break;
                    }
                    Ok(cmd) => self.handle_command(cmd),
                    Err(_) => {
                        warn!("Command channel disconnected");
                        break;
                    }
                },
                recv(engine_rx) -> event => match event {
                    Ok(event) => self.orchestrator.handle_engine_event(event),
                    Err(_) => {
                        error!("Engine event channel disconnected");
                        break;
                    }
                },
                default(wait) => {}
            }

            self.orchestrator.tick(Instant::now());
        }

        self.orchestrator.dispose();
        events.publish(VoiceEvent::Shutdown);
        info!("Voice runtime stopped");
    }

    fn handle_command(&mut self, cmd: VoiceCommand) {
        let now = Instant::now();
        match cmd {
            VoiceCommand::StartListening { config, reply } => {
                let started = self.orchestrator.start_listening(&config, now);
                if reply.send(started).is_err() {
                    debug!("Start listening caller went away");
                }
            }
            VoiceCommand::StopListening => self.orchestrator.stop_listening(now),
            VoiceCommand::Speak {
                text,
                options,
                reply,
            } => {
                let result = self.orchestrator.speak(&text, &options);
                if reply.send(result).is_err() {
                    debug!("Speak caller went away");
                }
            }
            VoiceCommand::StopSpeaking => self.orchestrator.stop_speaking(),
            VoiceCommand::SetHandsFree(enabled) => self.orchestrator.set_hands_free(enabled),
            VoiceCommand::ReportError(error) => self.orchestrator.report_external(error),
            VoiceCommand::Shutdown => {}
        }
    }
}

/// Handle for controlling the voice runtime from the UI, the hands-free loop
/// or tests
///
/// This provides the public interface for:
/// - Sending commands (synchronous results come back over a reply channel)
/// - Subscribing to events
/// - Querying state (via SharedVoiceState)
#[derive(Clone)]
pub struct VoiceHandle {
    command_tx: Sender<VoiceCommand>,
    state: SharedVoiceState,
    events: EventBus,
    default_capture: CaptureConfig,
    shutdown_timeout: Duration,
}

impl VoiceHandle {
    fn send_command(&self, cmd: VoiceCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| VoiceError::ChannelError(format!("Failed to send command: {}", e)))
    }

    /// Begin capture with `config`
    ///
    /// Returns false if the request was rejected or the runtime is gone.
    pub fn start_listening(&self, config: CaptureConfig) -> bool {
        let (reply, rx) = bounded(1);
        if let Err(e) = self.send_command(VoiceCommand::StartListening { config, reply }) {
            warn!("Cannot start listening: {}", e);
            return false;
        }
        rx.recv().unwrap_or(false)
    }

    /// Begin capture with the runtime's default capture config
    pub fn listen(&self) -> bool {
        self.start_listening(self.default_capture.clone())
    }

    /// Graceful stop of the current capture
    pub fn stop_listening(&self) -> Result<()> {
        self.send_command(VoiceCommand::StopListening)
    }

    /// Speak `text`; the completion resolves when the utterance ends
    pub fn speak(&self, text: impl Into<String>, options: SpeechOptions) -> Result<SpeechCompletion> {
        let (reply, rx) = bounded(1);
        self.send_command(VoiceCommand::Speak {
            text: text.into(),
            options,
            reply,
        })?;
        rx.recv()
            .map_err(|e| VoiceError::ChannelError(format!("No reply to speak: {}", e)))?
    }

    /// Cancel the current utterance
    pub fn stop_speaking(&self) -> Result<()> {
        self.send_command(VoiceCommand::StopSpeaking)
    }

    pub fn set_hands_free(&self, enabled: bool) -> Result<()> {
        self.send_command(VoiceCommand::SetHandsFree(enabled))
    }

    /// Surface an error on the event stream
    pub fn report_error(&self, error: VoiceError) -> Result<()> {
        self.send_command(VoiceCommand::ReportError(error))
    }

    /// Subscribe to voice events
    pub fn subscribe(&self) -> Receiver<VoiceEvent> {
        self.events.subscribe()
    }

    /// Get the shared state (for direct queries)
    pub fn state(&self) -> &SharedVoiceState {
        &self.state
    }

    /// Get a snapshot of current state
    pub fn snapshot(&self) -> VoiceStateSnapshot {
        self.state.snapshot()
    }

    pub fn status(&self) -> VoiceStatus {
        self.state.status()
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    pub fn is_speaking(&self) -> bool {
        self.state.is_speaking()
    }

    /// Ask the runtime to tear down and exit
    pub fn shutdown(&self) -> Result<()> {
        self.send_command(VoiceCommand::Shutdown)
    }

    /// Shut down and wait for the runtime thread, bounded by the configured
    /// shutdown timeout
    ///
    /// Returns true if the thread exited in time.
    pub fn shutdown_and_wait(&self, thread: JoinHandle<()>) -> bool {
        let events = self.subscribe();
        if self.shutdown().is_err() {
            // Loop already gone
            return thread.join().is_ok();
        }

        let deadline = Instant::now() + self.shutdown_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Shutdown timeout reached");
                return false;
            }
            match events.recv_timeout(remaining) {
                Ok(VoiceEvent::Shutdown) => break,
                Ok(_) => continue,
                Err(_) => {
                    warn!("Shutdown timeout reached");
                    return false;
                }
            }
        }
        thread.join().is_ok()
    }
}
