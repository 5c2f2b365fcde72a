//! Simulated speech platform
//!
//! Deterministic stand-ins for the native engines. They record every call,
//! can be scripted to emit recognition events, and let the caller finish or
//! fail utterances by hand. Used by the test suite and the demo binary, and
//! usable by hosts as a dry-run mode.
//!
//! All handles are cheap clones sharing one state, so a test can keep a copy
//! after boxing the engine into the orchestrator.

use super::{
    PermissionState, PlatformCapabilities, RecognitionEngine, RecognitionEvent, RecognitionSink,
    SpeechPlatform, SynthesisEngine, SynthesisSink, UtteranceId,
};
use crate::error::CaptureErrorCode;
use crate::speech::recognition::CaptureConfig;
use crate::speech::synthesis::VoiceParams;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct PlatformInner {
    caps: PlatformCapabilities,
    query_error: Option<String>,
    queries: usize,
}

/// Scriptable capability source
#[derive(Clone, Debug)]
pub struct SimulatedPlatform {
    inner: Arc<Mutex<PlatformInner>>,
}

impl SimulatedPlatform {
    /// Platform that reports full support
    pub fn ready() -> Self {
        Self::with_capabilities(PlatformCapabilities::ready())
    }

    /// Platform with no recognition engine
    pub fn without_recognition() -> Self {
        Self::with_capabilities(PlatformCapabilities {
            recognition_available: false,
            ..PlatformCapabilities::ready()
        })
    }

    pub fn with_capabilities(caps: PlatformCapabilities) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlatformInner {
                caps,
                query_error: None,
                queries: 0,
            })),
        }
    }

    pub fn set_environment_ready(&self, ready: bool) {
        self.inner.lock().caps.environment_ready = ready;
    }

    pub fn set_recognition_available(&self, available: bool) {
        self.inner.lock().caps.recognition_available = available;
    }

    pub fn set_permission(&self, permission: PermissionState) {
        self.inner.lock().caps.permission = permission;
    }

    /// Make every query fail with `error`
    pub fn fail_queries(&self, error: impl Into<String>) {
        self.inner.lock().query_error = Some(error.into());
    }

    /// Number of queries answered so far
    pub fn query_count(&self) -> usize {
        self.inner.lock().queries
    }
}

impl SpeechPlatform for SimulatedPlatform {
    fn query(&self) -> std::result::Result<PlatformCapabilities, String> {
        let mut inner = self.inner.lock();
        inner.queries += 1;
        match &inner.query_error {
            Some(error) => Err(error.clone()),
            None => Ok(inner.caps),
        }
    }
}

#[derive(Debug)]
struct RecognizerInner {
    starts: usize,
    stops: usize,
    aborts: usize,
    sink: Option<RecognitionSink>,
    last_config: Option<CaptureConfig>,
    fail_next_start: Option<String>,
    confirms_end: bool,
    end_on_stop: bool,
    script: VecDeque<Vec<RecognitionEvent>>,
}

/// Scriptable recognition engine
#[derive(Clone, Debug)]
pub struct SimulatedRecognizer {
    inner: Arc<Mutex<RecognizerInner>>,
}

impl Default for SimulatedRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRecognizer {
    /// Recognizer that confirms every stop with `Ended`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RecognizerInner {
                starts: 0,
                stops: 0,
                aborts: 0,
                sink: None,
                last_config: None,
                fail_next_start: None,
                confirms_end: true,
                end_on_stop: true,
                script: VecDeque::new(),
            })),
        }
    }

    /// Engine that is considered stopped as soon as `stop` returns
    pub fn without_end_confirmation(self) -> Self {
        {
            let mut inner = self.inner.lock();
            inner.confirms_end = false;
            inner.end_on_stop = false;
        }
        self
    }

    /// Engine that accepts `stop` but never reports `Ended` (a stalled engine)
    pub fn stalling_on_stop(self) -> Self {
        self.inner.lock().end_on_stop = false;
        self
    }

    /// Events to emit right after the next successful `start`
    pub fn queue_utterance(&self, events: Vec<RecognitionEvent>) {
        self.inner.lock().script.push_back(events);
    }

    /// Make the next `start` fail with `error`
    pub fn fail_next_start(&self, error: impl Into<String>) {
        self.inner.lock().fail_next_start = Some(error.into());
    }

    pub fn start_count(&self) -> usize {
        self.inner.lock().starts
    }

    pub fn stop_count(&self) -> usize {
        self.inner.lock().stops
    }

    pub fn abort_count(&self) -> usize {
        self.inner.lock().aborts
    }

    pub fn last_config(&self) -> Option<CaptureConfig> {
        self.inner.lock().last_config.clone()
    }

    /// Sink of the current capture
    pub fn current_sink(&self) -> Option<RecognitionSink> {
        self.inner.lock().sink.clone()
    }

    /// Emit an event for the current capture; false if none is running
    pub fn emit(&self, event: RecognitionEvent) -> bool {
        match self.current_sink() {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }

    pub fn interim(&self, text: impl Into<String>) -> bool {
        self.emit(RecognitionEvent::interim(text))
    }

    pub fn final_result(&self, text: impl Into<String>, confidence: f32) -> bool {
        self.emit(RecognitionEvent::final_result(text, confidence))
    }

    pub fn error(&self, code: CaptureErrorCode) -> bool {
        self.emit(RecognitionEvent::Error(code))
    }

    pub fn end(&self) -> bool {
        self.emit(RecognitionEvent::Ended)
    }
}

impl RecognitionEngine for SimulatedRecognizer {
    fn start(
        &mut self,
        config: &CaptureConfig,
        sink: RecognitionSink,
    ) -> std::result::Result<(), String> {
        let mut inner = self.inner.lock();
        inner.starts += 1;
        if let Some(error) = inner.fail_next_start.take() {
            return Err(error);
        }

        inner.last_config = Some(config.clone());
        sink.started();
        if let Some(events) = inner.script.pop_front() {
            debug!("Simulated recognizer replaying {} scripted events", events.len());
            for event in events {
                sink.emit(event);
            }
        }
        inner.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) -> std::result::Result<(), String> {
        let mut inner = self.inner.lock();
        inner.stops += 1;
        if inner.end_on_stop {
            if let Some(sink) = &inner.sink {
                sink.ended();
            }
        }
        Ok(())
    }

    fn abort(&mut self) -> std::result::Result<(), String> {
        let mut inner = self.inner.lock();
        inner.aborts += 1;
        inner.sink = None;
        Ok(())
    }

    fn confirms_end(&self) -> bool {
        self.inner.lock().confirms_end
    }
}

/// An utterance the simulated synthesizer was asked to speak
#[derive(Clone, Debug, PartialEq)]
pub struct SpokenUtterance {
    pub id: UtteranceId,
    pub text: String,
    pub params: VoiceParams,
}

#[derive(Debug)]
struct SynthesizerInner {
    spoken: Vec<SpokenUtterance>,
    sinks: Vec<SynthesisSink>,
    cancels: usize,
    auto_complete: bool,
    fail_next_speak: Option<String>,
}

/// Scriptable synthesis engine
#[derive(Clone, Debug)]
pub struct SimulatedSynthesizer {
    inner: Arc<Mutex<SynthesizerInner>>,
}

impl Default for SimulatedSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSynthesizer {
    /// Synthesizer whose utterances finish only when told to
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SynthesizerInner {
                spoken: Vec::new(),
                sinks: Vec::new(),
                cancels: 0,
                auto_complete: false,
                fail_next_speak: None,
            })),
        }
    }

    /// Synthesizer that reports every utterance finished right away
    pub fn auto_completing() -> Self {
        let synthesizer = Self::new();
        synthesizer.inner.lock().auto_complete = true;
        synthesizer
    }

    /// Make the next `speak` fail synchronously
    pub fn fail_next_speak(&self, error: impl Into<String>) {
        self.inner.lock().fail_next_speak = Some(error.into());
    }

    pub fn spoken(&self) -> Vec<SpokenUtterance> {
        self.inner.lock().spoken.clone()
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.inner.lock().spoken.iter().map(|u| u.text.clone()).collect()
    }

    pub fn cancel_count(&self) -> usize {
        self.inner.lock().cancels
    }

    fn sink_for(&self, id: UtteranceId) -> Option<SynthesisSink> {
        self.inner
            .lock()
            .sinks
            .iter()
            .find(|s| s.utterance() == id)
            .cloned()
    }

    /// Report `id` as played to the end
    pub fn finish_utterance(&self, id: UtteranceId) -> bool {
        self.sink_for(id).map(|s| s.finished()).unwrap_or(false)
    }

    /// Report `id` as failed
    pub fn fail_utterance(&self, id: UtteranceId, error: impl Into<String>) -> bool {
        self.sink_for(id).map(|s| s.failed(error)).unwrap_or(false)
    }

    /// Finish the most recent utterance
    pub fn finish_latest(&self) -> bool {
        let latest = self.inner.lock().sinks.last().cloned();
        latest.map(|s| s.finished()).unwrap_or(false)
    }
}

impl SynthesisEngine for SimulatedSynthesizer {
    fn speak(
        &mut self,
        text: &str,
        params: &VoiceParams,
        sink: SynthesisSink,
    ) -> std::result::Result<(), String> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.fail_next_speak.take() {
            return Err(error);
        }

        inner.spoken.push(SpokenUtterance {
            id: sink.utterance(),
            text: text.to_string(),
            params: params.clone(),
        });
        sink.started();
        if inner.auto_complete {
            sink.finished();
        }
        inner.sinks.push(sink);
        Ok(())
    }

    fn cancel(&mut self) -> std::result::Result<(), String> {
        self.inner.lock().cancels += 1;
        Ok(())
    }
}
