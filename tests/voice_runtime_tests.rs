//! Integration tests for the threaded voice runtime
//!
//! These tests drive the public handle against the simulated platform and
//! observe behavior through events and shared state.

use crossbeam_channel::Receiver;
use dixon_voice::platform::simulated::{SimulatedPlatform, SimulatedRecognizer, SimulatedSynthesizer};
use dixon_voice::platform::RecognitionEvent;
use dixon_voice::{
    CaptureConfig, CaptureErrorCode, SpeechOptions, SpeechOutcome, VoiceConfig, VoiceError,
    VoiceEvent, VoiceHandle, VoicePlatform, VoiceRuntime, VoiceStatus,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct Harness {
    voice: VoiceHandle,
    thread: JoinHandle<()>,
    recognizer: SimulatedRecognizer,
    synthesizer: SimulatedSynthesizer,
    events: Receiver<VoiceEvent>,
}

fn start(platform: SimulatedPlatform, synthesizer: SimulatedSynthesizer) -> Harness {
    let recognizer = SimulatedRecognizer::new();
    let (runtime, voice) = VoiceRuntime::new(
        VoiceConfig::default(),
        VoicePlatform::new(platform, recognizer.clone(), synthesizer.clone()),
    )
    .expect("runtime");
    let events = voice.subscribe();
    let thread = runtime.start().expect("start");
    Harness {
        voice,
        thread,
        recognizer,
        synthesizer,
        events,
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Collect events until `stop` matches one, or the timeout passes
fn collect_until(
    events: &Receiver<VoiceEvent>,
    timeout: Duration,
    stop: impl Fn(&VoiceEvent) -> bool,
) -> Vec<VoiceEvent> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    while let Ok(event) = events.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        let done = stop(&event);
        seen.push(event);
        if done {
            break;
        }
    }
    seen
}

#[test]
fn test_basic_capture_scenario() {
    let h = start(SimulatedPlatform::ready(), SimulatedSynthesizer::new());
    h.recognizer.queue_utterance(vec![
        RecognitionEvent::interim("my car"),
        RecognitionEvent::interim("my car won't"),
        RecognitionEvent::final_result("my car won't start", 0.92),
    ]);

    assert!(h.voice.listen());

    let events = collect_until(&h.events, Duration::from_secs(2), |e| {
        matches!(e, VoiceEvent::StatusChanged(VoiceStatus::Idle))
    });
    let results: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            VoiceEvent::Transcript(r) => Some(r.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].transcript_text, "my car");
    assert_eq!(results[1].transcript_text, "my car won't");
    assert!(results[2].is_final);
    assert_eq!(results[2].transcript_text, "my car won't start");
    assert_eq!(results[2].confidence_score, 0.92);

    assert!(h.voice.is_idle());
    assert_eq!(h.voice.state().final_transcript(), "my car won't start");
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_timeout_scenario() {
    let h = start(SimulatedPlatform::ready(), SimulatedSynthesizer::new());

    assert!(h
        .voice
        .start_listening(CaptureConfig::default().with_timeout_ms(100)));
    assert!(h.voice.state().is_listening());

    assert!(wait_until(Duration::from_secs(2), || h.voice.is_idle()));
    assert_eq!(h.recognizer.stop_count(), 1);
    assert_eq!(h.recognizer.abort_count(), 0);
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_unsupported_environment_scenario() {
    let h = start(SimulatedPlatform::without_recognition(), SimulatedSynthesizer::new());

    assert!(!h.voice.listen());
    assert_eq!(h.recognizer.start_count(), 0);
    assert!(!h.voice.snapshot().support.is_supported);

    let events = collect_until(&h.events, Duration::from_secs(1), |e| {
        matches!(e, VoiceEvent::Error(_))
    });
    assert!(events
        .iter()
        .any(|e| matches!(e, VoiceEvent::Error(VoiceError::NotSupported(_)))));
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_capture_error_recovers_to_idle() {
    let h = start(SimulatedPlatform::ready(), SimulatedSynthesizer::new());
    assert!(h.voice.listen());

    h.recognizer.error(CaptureErrorCode::AudioCapture);
    let events = collect_until(&h.events, Duration::from_secs(2), |e| {
        matches!(e, VoiceEvent::StatusChanged(VoiceStatus::Idle))
    });

    assert!(events.contains(&VoiceEvent::Error(VoiceError::CaptureFailed(
        CaptureErrorCode::AudioCapture
    ))));
    assert!(events
        .iter()
        .any(|e| matches!(e, VoiceEvent::StatusChanged(VoiceStatus::Error(_)))));
    assert!(h.voice.is_idle());
    assert!(h.voice.listen());
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_interrupt_and_replace_through_handle() {
    let h = start(SimulatedPlatform::ready(), SimulatedSynthesizer::new());

    let first = h.voice.speak("Your oil is low", SpeechOptions::new()).unwrap();
    let second = h.voice.speak("Pull over safely", SpeechOptions::new()).unwrap();
    assert_eq!(first.wait_blocking(), SpeechOutcome::Interrupted);

    let second_id = second.id();
    h.synthesizer.finish_utterance(second_id);
    assert_eq!(second.wait_blocking(), SpeechOutcome::Completed);
    assert!(wait_until(Duration::from_secs(1), || h.voice.is_idle()));
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_listening_rejected_while_speaking() {
    let h = start(SimulatedPlatform::ready(), SimulatedSynthesizer::new());

    let _completion = h.voice.speak("One moment", SpeechOptions::new()).unwrap();
    assert!(h.voice.is_speaking());
    assert!(!h.voice.listen());
    assert_eq!(h.recognizer.start_count(), 0);

    h.voice.stop_speaking().unwrap();
    assert!(wait_until(Duration::from_secs(1), || h.voice.is_idle()));
    assert!(h.voice.listen());
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_shutdown_interrupts_pending_speech() {
    let h = start(SimulatedPlatform::ready(), SimulatedSynthesizer::new());
    let completion = h.voice.speak("Checking your battery", SpeechOptions::new()).unwrap();

    let voice = h.voice.clone();
    assert!(voice.shutdown_and_wait(h.thread));
    assert_eq!(completion.wait_blocking(), SpeechOutcome::Interrupted);
    assert_eq!(h.synthesizer.cancel_count(), 1);
    assert!(!h.voice.listen());
}

#[test]
fn test_snapshot_serializes_to_json() {
    let h = start(SimulatedPlatform::ready(), SimulatedSynthesizer::auto_completing());
    let completion = h.voice.speak("Tire pressure is 32 psi", SpeechOptions::automotive()).unwrap();
    assert!(completion.wait_blocking().is_completed());

    let spoken = h.synthesizer.spoken();
    assert_eq!(spoken[0].text, "Tire pressure is 32 P S I");
    assert!((spoken[0].params.rate - 0.72).abs() < 1e-6);

    let json = serde_json::to_value(h.voice.snapshot()).unwrap();
    assert_eq!(json["hands_free"], false);
    assert_eq!(json["support"]["is_supported"], true);
    assert!(h.voice.shutdown_and_wait(h.thread));
}
