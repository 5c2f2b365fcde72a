//! Voice orchestrator: the single state machine over capture and playback
//!
//! The orchestrator owns the capability probe, the recognition session, the
//! synthesis channel and the one capture timer. Every state transition
//! happens inside one of its methods, and it is driven with explicit
//! `Instant`s so tests can step time by hand:
//! - caller operations: `start_listening`, `stop_listening`, `speak`, `stop_speaking`
//! - engine events: `handle_engine_event` (or `pump` to drain the queue)
//! - time: `tick`, with `next_deadline` telling the host when to call it
//!
//! The orchestrator is the only writer of `SharedVoiceState`. Subscribers get
//! `VoiceEvent`s through the `EventBus`.

use crate::error::{Activity, Result, VoiceError};
use crate::integration::config::VoiceConfig;
use crate::integration::timer::{CaptureTimer, TimerPurpose};
use crate::platform::{EngineEvent, UtteranceId, VoicePlatform};
use crate::speech::probe::{CapabilityProbe, SupportState};
use crate::speech::recognition::{
    CaptureConfig, CaptureResult, RecognitionSession, SessionUpdate, StopOutcome,
};
use crate::speech::synthesis::{
    SpeechCompletion, SpeechOptions, SpeechOutcome, SpeechRequest, SynthesisChannel,
    SynthesisUpdate,
};
use crate::state::{SharedVoiceState, VoiceEvent, VoiceStatus};
use crate::utils::channels::EventBus;
use crossbeam_channel::{bounded, Receiver};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Completion sender for the utterance currently playing
struct PendingSpeech {
    id: UtteranceId,
    tx: oneshot::Sender<SpeechOutcome>,
}

impl PendingSpeech {
    fn resolve(self, outcome: SpeechOutcome) {
        debug!("Utterance {} resolved as {:?}", self.id, outcome);
        // The caller may have dropped its completion
        let _ = self.tx.send(outcome);
    }
}

/// The voice core state machine
pub struct VoiceOrchestrator {
    config: VoiceConfig,
    state: SharedVoiceState,
    events: EventBus,
    probe: CapabilityProbe,
    support: SupportState,
    session: RecognitionSession,
    channel: SynthesisChannel,
    timer: CaptureTimer,
    engine_rx: Receiver<EngineEvent>,
    status: VoiceStatus,
    pending_speech: Option<PendingSpeech>,
    disposed: bool,
}

impl VoiceOrchestrator {
    /// Create an orchestrator over `platform`
    ///
    /// Capability detection runs once here; `attach` runs it again and
    /// schedules the follow-up check.
    pub fn new(config: VoiceConfig, platform: VoicePlatform) -> Result<Self> {
        config.validate()?;

        let (engine_tx, engine_rx) = bounded(config.channel_buffer_size * 10);
        let mut probe = CapabilityProbe::new(platform.probe);
        let support = probe.detect();

        let state = SharedVoiceState::new();
        state.write().support = support.clone();

        Ok(Self {
            events: EventBus::new(config.channel_buffer_size),
            session: RecognitionSession::new(platform.recognizer, engine_tx.clone()),
            channel: SynthesisChannel::new(platform.synthesizer, engine_tx.clone()),
            config,
            state,
            probe,
            support,
            timer: CaptureTimer::new(),
            engine_rx,
            status: VoiceStatus::Idle,
            pending_speech: None,
            disposed: false,
        })
    }

    /// Shared state, for synchronous reads
    pub fn state(&self) -> SharedVoiceState {
        self.state.clone()
    }

    /// Event bus, for subscribing
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Receiver of engine events, for a host loop to select on
    pub fn engine_events(&self) -> Receiver<EngineEvent> {
        self.engine_rx.clone()
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    pub fn status(&self) -> &VoiceStatus {
        &self.status
    }

    pub fn support(&self) -> &SupportState {
        &self.support
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Fresh capability detection for a newly attached environment
    pub fn attach(&mut self, now: Instant) {
        let support = self.probe.attach(now, self.config.probe_recheck_delay());
        self.update_support(support);
    }

    /// Begin capture
    ///
    /// Returns false when the request is rejected or the engine fails to
    /// start; the reason is reported on the event stream.
    pub fn start_listening(&mut self, config: &CaptureConfig, now: Instant) -> bool {
        if self.disposed {
            warn!("Cannot start listening: voice core disposed");
            return false;
        }
        if self.session.is_active() {
            warn!("Cannot start listening: already listening");
            self.report(VoiceError::AlreadyActive(Activity::Listening));
            return false;
        }
        if self.channel.is_speaking() {
            warn!("Cannot start listening: speaking");
            self.report(VoiceError::AlreadyActive(Activity::Speaking));
            return false;
        }
        if !self.support.is_supported {
            warn!("Cannot start listening: {}", self.support.reason());
            self.report(VoiceError::NotSupported(self.support.reason()));
            return false;
        }

        if let Err(e) = config.validate() {
            warn!("Cannot start listening: {}", e);
            self.report(e);
            return false;
        }

        self.session.reset_transcript();
        self.state.write().begin_capture();

        match self.session.start(config, &self.support) {
            Ok(true) => {
                if let (Some(timeout), Some(id)) = (config.timeout(), self.session.current_id()) {
                    self.timer.arm(TimerPurpose::CaptureTimeout, id, now + timeout);
                }
                self.set_status(VoiceStatus::Listening);
                info!("Listening started");
                true
            }
            Ok(false) => false,
            Err(e) => {
                self.fail(e);
                false
            }
        }
    }

    /// Graceful stop; a no-op when nothing is capturing
    pub fn stop_listening(&mut self, now: Instant) {
        if self.timer.purpose() == Some(TimerPurpose::StopGrace) {
            debug!("Stop already requested");
            return;
        }

        match self.session.stop() {
            StopOutcome::NotActive => {
                self.timer.cancel();
                debug!("Stop ignored: not listening");
            }
            StopOutcome::AwaitingEnd => {
                self.timer.cancel();
                if let Some(id) = self.session.current_id() {
                    self.timer
                        .arm(TimerPurpose::StopGrace, id, now + self.config.stop_grace());
                }
                info!("Listening stop requested");
            }
            StopOutcome::Ended => {
                self.timer.cancel();
                self.state.write().end_capture();
                self.set_status(VoiceStatus::Idle);
                info!("Listening stopped");
            }
        }
    }

    /// Speak `text`, interrupting any utterance in progress
    pub fn speak(&mut self, text: &str, options: &SpeechOptions) -> Result<SpeechCompletion> {
        if self.disposed {
            return Err(VoiceError::ChannelError("voice core disposed".to_string()));
        }
        if self.session.is_active() {
            warn!("Cannot speak: listening");
            let err = VoiceError::AlreadyActive(Activity::Listening);
            self.report(err.clone());
            return Err(err);
        }

        let request = match SpeechRequest::new(text, options) {
            Ok(request) => request,
            Err(e) => {
                self.report(e.clone());
                return Err(e);
            }
        };

        if let Some(previous) = self.pending_speech.take() {
            previous.resolve(SpeechOutcome::Interrupted);
        }

        match self.channel.speak(request) {
            Ok(id) => {
                let (tx, completion) = SpeechCompletion::channel(id);
                self.pending_speech = Some(PendingSpeech { id, tx });
                self.state.write().current_utterance = Some(id);
                self.set_status(VoiceStatus::Speaking);
                Ok(completion)
            }
            Err(e) => {
                self.state.write().current_utterance = None;
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Cancel the current utterance; safe when idle
    pub fn stop_speaking(&mut self) {
        if let Some(id) = self.channel.stop() {
            info!("Speech {} stopped", id);
            if let Some(pending) = self.pending_speech.take() {
                pending.resolve(SpeechOutcome::Interrupted);
            }
            self.state.write().current_utterance = None;
            self.set_status(VoiceStatus::Idle);
        }
    }

    /// Record the hands-free flag in the shared state
    pub fn set_hands_free(&mut self, enabled: bool) {
        let mut state = self.state.write();
        if state.hands_free != enabled {
            info!("Hands-free {}", if enabled { "enabled" } else { "disabled" });
            state.hands_free = enabled;
        }
    }

    /// Report an error raised outside the core (e.g. by the hands-free loop)
    pub fn report_external(&mut self, error: VoiceError) {
        self.report(error);
    }

    /// Apply one engine event
    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        if self.disposed {
            return;
        }
        match event {
            EngineEvent::Recognition { session, event } => {
                if let Some(update) = self.session.handle_event(session, event) {
                    self.on_session_update(update);
                }
            }
            EngineEvent::Synthesis { utterance, event } => {
                if let Some(update) = self.channel.handle_event(utterance, event) {
                    self.on_synthesis_update(update);
                }
            }
        }
    }

    fn on_session_update(&mut self, update: SessionUpdate) {
        match update {
            SessionUpdate::Started => debug!("Microphone open"),

            SessionUpdate::Result(result) if !result.is_final => {
                if self.status == VoiceStatus::Listening {
                    self.set_status(VoiceStatus::Processing);
                }
                self.publish_result(result);
            }

            SessionUpdate::Result(result) => {
                debug!(
                    "Final transcript: \"{}\" ({:.2})",
                    result.transcript_text, result.confidence_score
                );
                let continuous = self
                    .session
                    .active_config()
                    .map(|c| c.continuous)
                    .unwrap_or(false);

                if continuous && self.session.is_active() {
                    self.publish_result(result);
                    // A stopping session keeps its status until the engine ends it
                    if !self.session.is_stopping() {
                        self.timer.cancel();
                        self.set_status(VoiceStatus::Listening);
                    }
                } else {
                    self.timer.cancel();
                    self.session.complete();
                    self.publish_result(result);
                    self.state.write().end_capture();
                    self.set_status(VoiceStatus::Idle);
                }
            }

            SessionUpdate::Failed(code) => {
                self.timer.cancel();
                self.state.write().end_capture();
                self.fail(VoiceError::CaptureFailed(code));
            }

            SessionUpdate::Ended => {
                self.timer.cancel();
                self.state.write().end_capture();
                if self.status.is_capturing() {
                    self.set_status(VoiceStatus::Idle);
                }
                info!("Listening ended");
            }
        }
    }

    fn on_synthesis_update(&mut self, update: SynthesisUpdate) {
        match update {
            SynthesisUpdate::Started(id) => {
                self.events.publish(VoiceEvent::SpeechStarted(id));
            }
            SynthesisUpdate::Finished(id) => {
                info!("Speech {} finished", id);
                self.state.write().current_utterance = None;
                self.set_status(VoiceStatus::Idle);
                if let Some(pending) = self.pending_speech.take() {
                    pending.resolve(SpeechOutcome::Completed);
                }
                self.events.publish(VoiceEvent::SpeechFinished(id));
            }
            SynthesisUpdate::Failed(id, reason) => {
                let err = VoiceError::SynthesisFailed(reason);
                self.state.write().current_utterance = None;
                if let Some(pending) = self.pending_speech.take() {
                    pending.resolve(SpeechOutcome::Failed(err.clone()));
                }
                warn!("Speech {} failed", id);
                self.fail(err);
            }
        }
    }

    /// Fire whatever deadline has expired
    pub fn tick(&mut self, now: Instant) {
        if self.disposed {
            return;
        }

        if let Some(support) = self.probe.poll_recheck(now) {
            self.update_support(support);
        }

        let Some((purpose, session)) = self.timer.poll(now) else {
            return;
        };
        if self.session.current_id() != Some(session) {
            debug!("Ignoring {:?} deadline for finished session {}", purpose, session);
            return;
        }

        match purpose {
            TimerPurpose::CaptureTimeout => {
                info!("Capture timeout reached, stopping session {}", session);
                self.stop_listening(now);
            }
            TimerPurpose::StopGrace => {
                warn!("Engine did not confirm stop of session {}, aborting", session);
                self.session.abort();
                self.state.write().end_capture();
                self.set_status(VoiceStatus::Idle);
            }
        }
    }

    /// Earliest instant at which `tick` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.timer.deadline(), self.probe.recheck_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Process every queued engine event and any expired deadline
    ///
    /// Returns the number of engine events handled.
    pub fn pump(&mut self, now: Instant) -> usize {
        let mut handled = self.drain_engine_events();
        self.tick(now);
        handled += self.drain_engine_events();
        handled
    }

    fn drain_engine_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.engine_rx.try_recv() {
            self.handle_engine_event(event);
            handled += 1;
        }
        handled
    }

    /// Tear everything down; errors are ignored
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        info!("Disposing voice core");

        self.timer.cancel();
        self.session.abort();
        self.channel.stop();
        if let Some(pending) = self.pending_speech.take() {
            pending.resolve(SpeechOutcome::Interrupted);
        }
        while self.engine_rx.try_recv().is_ok() {}

        {
            let mut state = self.state.write();
            state.end_capture();
            state.current_utterance = None;
        }
        self.set_status(VoiceStatus::Idle);
        self.disposed = true;
    }

    fn publish_result(&mut self, result: CaptureResult) {
        self.state.write().record_result(&result);
        self.events.publish(VoiceEvent::Transcript(result));
    }

    fn update_support(&mut self, support: SupportState) {
        if support == self.support {
            return;
        }
        info!(
            "Speech support changed (supported: {}, initializing: {})",
            support.is_supported, support.is_initializing
        );
        self.support = support.clone();
        self.state.write().support = support.clone();
        self.events.publish(VoiceEvent::SupportChanged(support));
    }

    fn set_status(&mut self, status: VoiceStatus) {
        if self.status == status {
            return;
        }
        debug!("Voice status {} -> {}", self.status, status);
        self.status = status.clone();
        self.state.write().status = status.clone();
        self.events.publish(VoiceEvent::StatusChanged(status));
    }

    /// Record and publish an error without changing status
    fn report(&mut self, error: VoiceError) {
        warn!("Voice error: {}", error);
        self.state.write().record_error(&error);
        self.events.publish(VoiceEvent::Error(error));
    }

    /// Report an error, pass through `Error` and settle in `Idle`
    fn fail(&mut self, error: VoiceError) {
        let reason = error.to_string();
        self.report(error);
        self.set_status(VoiceStatus::Error(reason));
        self.set_status(VoiceStatus::Idle);
    }
}

impl Drop for VoiceOrchestrator {
    fn drop(&mut self) {
        self.dispose();
    }
}
