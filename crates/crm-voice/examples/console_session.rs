//! Console session - the full pipeline with typed input and printed speech.
//!
//! The terminal has no speech recognizer, so every session falls back to typed
//! input. Responses are "spoken" by printing each chunk. Settings come from
//! `config/voice.toml` (or `CRM_VOICE_CONFIG`); point
//! `CRM_VOICE__BACKEND__BASE_URL` at a running CRM backend to override the file.
//!
//! Empty line or EOF ends the demo.

use anyhow::Context;
use async_trait::async_trait;
use crm_voice::{
    init_tracing, CaptureError, HttpCrmBackend, ManualInput, PlatformVoice, RecognitionHandle,
    RecognitionRequest, SessionOrchestrator, SharedVoiceCatalog, SpeechPlatform, SpeechRecognizer,
    Utterance, UtteranceEvent, VoiceConfig,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, Mutex};
use tracing::info;

struct NoRecognizer;

#[async_trait]
impl SpeechRecognizer for NoRecognizer {
    fn is_available(&self) -> bool {
        false
    }

    fn start(&self, _request: RecognitionRequest) -> Result<RecognitionHandle, String> {
        Err("no recognizer in a terminal".to_string())
    }

    async fn probe_microphone(&self) -> Result<(), String> {
        Err("no microphone in a terminal".to_string())
    }
}

struct StdinInput {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

#[async_trait]
impl ManualInput for StdinInput {
    async fn prompt(&self, message: &str) -> Option<String> {
        println!("\n{}", message);
        self.lines.lock().await.next_line().await.ok().flatten()
    }
}

struct PrintedSpeech;

impl SpeechPlatform for PrintedSpeech {
    fn is_available(&self) -> bool {
        true
    }

    fn speak(&self, utterance: Utterance) -> Result<mpsc::UnboundedReceiver<UtteranceEvent>, String> {
        let voice = utterance.voice.map(|v| v.name).unwrap_or_else(|| "default".to_string());
        println!("🔊 [{} {}] {}", voice, utterance.lang, utterance.text);
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(UtteranceEvent::Start);
        let _ = tx.send(UtteranceEvent::End);
        Ok(rx)
    }

    fn cancel(&self) {}

    fn is_speaking(&self) -> bool {
        false
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = VoiceConfig::load().context("loading voice config")?;
    info!(target: "crm::voice", backend = %config.backend.base_url, "Console session starting");

    let backend = HttpCrmBackend::new(config.backend.clone()).context("building HTTP client")?;
    let catalog = SharedVoiceCatalog::new(vec![PlatformVoice::new("Console Dilara", "fa-IR")]);
    let orchestrator = SessionOrchestrator::from_config(
        &config,
        Arc::new(NoRecognizer),
        Arc::new(PrintedSpeech),
        Arc::new(catalog),
        Arc::new(backend),
    )?
    .with_manual_input(Arc::new(StdinInput {
        lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
    }));
    orchestrator.initialize().await;

    let cancelled = CaptureError::ManualInputCancelled.user_message();
    let empty = CaptureError::ManualInputEmpty.user_message();
    loop {
        let session = orchestrator.handle_voice_interaction()?;
        let outcome = tokio::select! {
            outcome = session => outcome,
            _ = tokio::signal::ctrl_c() => {
                orchestrator.stop_audio_processing();
                break;
            }
        };
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        if !outcome.success && (outcome.response.text == cancelled || outcome.response.text == empty) {
            break;
        }
    }

    orchestrator.shutdown();
    Ok(())
}
