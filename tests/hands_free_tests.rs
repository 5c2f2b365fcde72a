//! Integration tests for the hands-free loop
//!
//! Each test runs a real voice runtime on the simulated platform, with an
//! auto-completing synthesizer so spoken responses finish on their own.

use dixon_voice::platform::simulated::{SimulatedPlatform, SimulatedRecognizer, SimulatedSynthesizer};
use dixon_voice::platform::RecognitionEvent;
use dixon_voice::speech::normalize_text_for_speech;
use dixon_voice::{
    HandsFreeConfig, HandsFreeController, HandsFreeLoop, ResponseProducer, SpeechOptions,
    VoiceConfig, VoiceError, VoiceEvent, VoiceHandle, VoicePlatform, VoiceRuntime,
};
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct Harness {
    voice: VoiceHandle,
    thread: JoinHandle<()>,
    recognizer: SimulatedRecognizer,
    synthesizer: SimulatedSynthesizer,
}

fn start(synthesizer: SimulatedSynthesizer) -> Harness {
    let recognizer = SimulatedRecognizer::new();
    let (runtime, voice) = VoiceRuntime::new(
        VoiceConfig::default(),
        VoicePlatform::new(SimulatedPlatform::ready(), recognizer.clone(), synthesizer.clone()),
    )
    .expect("runtime");
    let thread = runtime.start().expect("start");
    Harness {
        voice,
        thread,
        recognizer,
        synthesizer,
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

fn answer_with(text: &'static str) -> ResponseProducer {
    Arc::new(move |_transcript: String| async move { Ok::<_, String>(text.to_string()) }.boxed())
}

#[test]
fn test_hands_free_turn_rearms_listening() {
    let h = start(SimulatedSynthesizer::auto_completing());
    h.recognizer.queue_utterance(vec![
        RecognitionEvent::interim("my check engine"),
        RecognitionEvent::final_result("my check engine light is on", 0.88),
    ]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_producer = Arc::clone(&seen);
    let producer: ResponseProducer = Arc::new(move |transcript: String| {
        seen_in_producer.lock().push(transcript);
        async { Ok::<_, String>("Check the gas cap first".to_string()) }.boxed()
    });

    let hands_free = HandsFreeLoop::new(h.voice.clone(), HandsFreeConfig::default(), producer)
        .expect("hands-free loop");
    hands_free.enable();
    assert!(wait_until(Duration::from_secs(1), || h.voice.snapshot().hands_free));

    assert!(wait_until(Duration::from_secs(3), || h.recognizer.start_count() == 2));
    assert_eq!(*seen.lock(), vec!["my check engine light is on".to_string()]);

    let spoken = h.synthesizer.spoken();
    assert_eq!(spoken.len(), 1);
    assert_eq!(spoken[0].text, "Check the gas cap first");
    assert_eq!(spoken[0].params, SpeechOptions::automotive().resolve());

    assert!(wait_until(Duration::from_secs(1), || hands_free.stats().turns_completed == 1));
    assert_eq!(hands_free.stats().turns_failed, 0);
    assert!(h.voice.state().is_listening());

    drop(hands_free);
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_disable_mid_turn_skips_rearm() {
    let h = start(SimulatedSynthesizer::auto_completing());
    h.recognizer.queue_utterance(vec![RecognitionEvent::final_result(
        "how much is a brake job",
        0.9,
    )]);

    let slot: Arc<Mutex<Option<HandsFreeController>>> = Arc::new(Mutex::new(None));
    let slot_in_producer = Arc::clone(&slot);
    let producer: ResponseProducer = Arc::new(move |_transcript: String| {
        if let Some(controller) = slot_in_producer.lock().as_ref() {
            controller.disable();
        }
        async { Ok::<_, String>("Usually between $150 and $300.".to_string()) }.boxed()
    });

    let hands_free = HandsFreeLoop::new(h.voice.clone(), HandsFreeConfig::default(), producer)
        .expect("hands-free loop");
    *slot.lock() = Some(hands_free.controller());
    hands_free.enable();

    // The answer is still spoken
    assert!(wait_until(Duration::from_secs(3), || hands_free.stats().turns_completed == 1));
    assert_eq!(
        h.synthesizer.spoken_texts(),
        vec!["Usually between 150 dollars and 300 dollars".to_string()]
    );

    // But listening is not re-armed
    thread::sleep(Duration::from_millis(100));
    assert_eq!(h.recognizer.start_count(), 1);
    assert!(!hands_free.is_enabled());
    assert!(h.voice.is_idle());
    assert!(!h.voice.snapshot().hands_free);

    drop(hands_free);
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_producer_failure_speaks_fallback_and_rearms() {
    let h = start(SimulatedSynthesizer::auto_completing());
    let events = h.voice.subscribe();
    h.recognizer
        .queue_utterance(vec![RecognitionEvent::final_result("why is my car shaking", 0.8)]);

    let producer: ResponseProducer = Arc::new(|_transcript: String| {
        async { Err::<String, _>("assistant backend unreachable".to_string()) }.boxed()
    });
    let config = HandsFreeConfig::default();
    let fallback = normalize_text_for_speech(&config.fallback_text);

    let hands_free =
        HandsFreeLoop::new(h.voice.clone(), config, producer).expect("hands-free loop");
    hands_free.enable();

    assert!(wait_until(Duration::from_secs(3), || h.recognizer.start_count() == 2));
    assert_eq!(h.synthesizer.spoken_texts(), vec![fallback]);
    assert!(wait_until(Duration::from_secs(1), || hands_free.stats().turns_failed == 1));

    let reported = events.try_iter().any(|e| {
        e == VoiceEvent::Error(VoiceError::ResponseFailed(
            "assistant backend unreachable".to_string(),
        ))
    });
    assert!(reported);

    drop(hands_free);
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_slow_producer_times_out() {
    let h = start(SimulatedSynthesizer::auto_completing());
    let events = h.voice.subscribe();
    h.recognizer
        .queue_utterance(vec![RecognitionEvent::final_result("find a mechanic nearby", 0.9)]);

    let producer: ResponseProducer = Arc::new(|_transcript: String| {
        async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, String>("too late".to_string())
        }
        .boxed()
    });
    let config = HandsFreeConfig::default()
        .with_response_timeout_ms(50)
        .with_fallback_text("Sorry, that took too long.");

    let hands_free =
        HandsFreeLoop::new(h.voice.clone(), config, producer).expect("hands-free loop");
    hands_free.enable();

    assert!(wait_until(Duration::from_secs(3), || h.recognizer.start_count() == 2));
    assert_eq!(
        h.synthesizer.spoken_texts(),
        vec!["Sorry, that took too long.".to_string()]
    );
    assert!(events
        .try_iter()
        .any(|e| e == VoiceEvent::Error(VoiceError::ResponseTimeout(50))));

    drop(hands_free);
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_rearm_waits_for_speech_to_finish() {
    let h = start(SimulatedSynthesizer::new());
    let _completion = h
        .voice
        .speak("Welcome back", SpeechOptions::automotive())
        .expect("speak");

    let hands_free =
        HandsFreeLoop::new(h.voice.clone(), HandsFreeConfig::default(), answer_with("ok"))
            .expect("hands-free loop");
    hands_free.enable();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(h.recognizer.start_count(), 0);

    assert!(h.synthesizer.finish_latest());
    assert!(wait_until(Duration::from_secs(2), || h.recognizer.start_count() == 1));

    drop(hands_free);
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_rearm_after_speech_is_stopped() {
    let h = start(SimulatedSynthesizer::new());
    let _completion = h
        .voice
        .speak("Welcome back", SpeechOptions::automotive())
        .expect("speak");

    let hands_free =
        HandsFreeLoop::new(h.voice.clone(), HandsFreeConfig::default(), answer_with("ok"))
            .expect("hands-free loop");
    hands_free.enable();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(h.recognizer.start_count(), 0);

    h.voice.stop_speaking().expect("stop speaking");
    assert!(wait_until(Duration::from_secs(2), || h.recognizer.start_count() == 1));
    assert!(hands_free.is_enabled());

    drop(hands_free);
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_rearm_after_speech_fails() {
    let h = start(SimulatedSynthesizer::new());
    let completion = h
        .voice
        .speak("Welcome back", SpeechOptions::automotive())
        .expect("speak");

    let hands_free =
        HandsFreeLoop::new(h.voice.clone(), HandsFreeConfig::default(), answer_with("ok"))
            .expect("hands-free loop");
    hands_free.enable();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(h.recognizer.start_count(), 0);

    assert!(h.synthesizer.fail_utterance(completion.id(), "audio device lost"));
    assert!(wait_until(Duration::from_secs(2), || h.recognizer.start_count() == 1));
    assert!(hands_free.is_enabled());

    drop(hands_free);
    assert!(h.voice.shutdown_and_wait(h.thread));
}

#[test]
fn test_disabled_loop_ignores_transcripts() {
    let h = start(SimulatedSynthesizer::auto_completing());
    h.recognizer
        .queue_utterance(vec![RecognitionEvent::final_result("hello dixon", 0.9)]);

    let hands_free =
        HandsFreeLoop::new(h.voice.clone(), HandsFreeConfig::default(), answer_with("hi"))
            .expect("hands-free loop");

    assert!(h.voice.listen());
    assert!(wait_until(Duration::from_secs(1), || h.voice.is_idle()));
    thread::sleep(Duration::from_millis(100));

    assert!(h.synthesizer.spoken().is_empty());
    assert_eq!(h.recognizer.start_count(), 1);
    assert_eq!(hands_free.stats().turns_completed, 0);

    drop(hands_free);
    assert!(h.voice.shutdown_and_wait(h.thread));
}
