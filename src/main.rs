use anyhow::{Context, Result};
use dixon_voice::platform::simulated::{SimulatedPlatform, SimulatedRecognizer, SimulatedSynthesizer};
use dixon_voice::platform::RecognitionEvent;
use dixon_voice::{
    HandsFreeConfig, HandsFreeLoop, ResponseProducer, VoiceConfig, VoiceEvent, VoicePlatform,
    VoiceRuntime,
};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dixon_voice=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Dixon voice demo on the simulated platform");

    let recognizer = SimulatedRecognizer::new();
    let synthesizer = SimulatedSynthesizer::auto_completing();
    recognizer.queue_utterance(vec![
        RecognitionEvent::interim("my brakes"),
        RecognitionEvent::interim("my brakes are squeaking"),
        RecognitionEvent::final_result("my brakes are squeaking when I stop", 0.91),
    ]);

    let (runtime, voice) = VoiceRuntime::new(
        VoiceConfig::default(),
        VoicePlatform::new(SimulatedPlatform::ready(), recognizer.clone(), synthesizer.clone()),
    )?;
    let runtime_thread = runtime.start()?;
    let events = voice.subscribe();

    let producer: ResponseProducer = Arc::new(|transcript: String| {
        async move {
            Ok::<_, String>(format!(
                "You said: {}. Squeaking brakes usually mean worn pads; have them checked within 500 mi.",
                transcript
            ))
        }
        .boxed()
    });

    let hands_free = HandsFreeLoop::new(voice.clone(), HandsFreeConfig::default(), producer)?;
    hands_free.enable();

    // One full turn: transcript, spoken answer, then the re-armed capture
    let mut spoken_answer = false;
    while let Ok(event) = events.recv_timeout(Duration::from_secs(5)) {
        match event {
            VoiceEvent::Transcript(result) => {
                info!(
                    "Transcript{}: {}",
                    if result.is_final { " (final)" } else { "" },
                    result.transcript_text
                );
            }
            VoiceEvent::SpeechFinished(_) => spoken_answer = true,
            VoiceEvent::StatusChanged(status) if spoken_answer && status.is_capturing() => {
                info!("Listening re-armed");
                break;
            }
            _ => {}
        }
    }

    hands_free.disable();
    for text in synthesizer.spoken_texts() {
        info!("Spoken: {}", text);
    }
    info!("Hands-free stats: {:?}", hands_free.stats());

    drop(hands_free);
    let clean = voice.shutdown_and_wait(runtime_thread);
    anyhow::ensure!(clean, "voice runtime did not stop in time");
    let snapshot = serde_json::to_string_pretty(&voice.snapshot())
        .context("Failed to serialize final state")?;
    info!("Final state: {}", snapshot);

    Ok(())
}
