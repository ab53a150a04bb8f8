//! Scripted platform and backend fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use crm_voice::{
    BackendError, CaptureConfig, CommandProcessor, CrmBackend, ManualInput, PlatformVoice,
    RecognitionAlternative, RecognitionControl, RecognitionEvent, RecognitionHandle,
    RecognitionRequest, ReportLookup, ResponseSynthesizer, SessionOrchestrator, SharedVoiceCatalog,
    SpeechCapture, SpeechPlatform, SpeechRecognizer, SynthesisConfig, Utterance, UtteranceEvent,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// What the fake recognizer does for one `start` call.
#[derive(Debug, Clone)]
pub enum Script {
    Final(&'static str),
    InterimThenFinal(&'static str, &'static str),
    Error(&'static str),
    EndWithoutResult,
    /// Never delivers anything; only a watchdog or a stop ends it.
    Silence,
}

#[derive(Default)]
pub struct FakeControl {
    pub stops: AtomicUsize,
    pub aborts: AtomicUsize,
}

impl RecognitionControl for FakeControl {
    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedRecognizer {
    pub available: AtomicBool,
    pub microphone_ok: AtomicBool,
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<RecognitionRequest>>,
    pub control: Arc<FakeControl>,
    silent: Mutex<Vec<mpsc::UnboundedSender<RecognitionEvent>>>,
}

impl ScriptedRecognizer {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(true),
            microphone_ok: AtomicBool::new(true),
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            control: Arc::new(FakeControl::default()),
            silent: Mutex::new(Vec::new()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        let recognizer = Self::new([]);
        recognizer.available.store(false, Ordering::SeqCst);
        recognizer
    }

    pub fn starts(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn languages(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.language.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<RecognitionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Deliver a final transcript to every attempt started with `Script::Silence`.
    pub fn finish_silent(&self, transcript: &str) {
        for tx in self.silent.lock().unwrap().drain(..) {
            let _ = tx.send(final_result(transcript));
        }
    }
}

fn final_result(transcript: &str) -> RecognitionEvent {
    RecognitionEvent::Result {
        is_final: true,
        alternatives: vec![RecognitionAlternative {
            transcript: transcript.to_string(),
            confidence: 0.92,
        }],
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn start(&self, request: RecognitionRequest) -> Result<RecognitionHandle, String> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Silence);

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(RecognitionEvent::Start);
        match script {
            Script::Final(text) => {
                let _ = tx.send(final_result(text));
                let _ = tx.send(RecognitionEvent::End);
            }
            Script::InterimThenFinal(interim, text) => {
                let _ = tx.send(RecognitionEvent::Result {
                    is_final: false,
                    alternatives: vec![RecognitionAlternative {
                        transcript: interim.to_string(),
                        confidence: 0.5,
                    }],
                });
                let _ = tx.send(final_result(text));
                let _ = tx.send(RecognitionEvent::End);
            }
            Script::Error(code) => {
                let _ = tx.send(RecognitionEvent::Error(code.to_string()));
                let _ = tx.send(RecognitionEvent::End);
            }
            Script::EndWithoutResult => {
                let _ = tx.send(RecognitionEvent::End);
            }
            Script::Silence => self.silent.lock().unwrap().push(tx),
        }

        Ok(RecognitionHandle {
            events: rx,
            control: self.control.clone(),
        })
    }

    async fn probe_microphone(&self) -> Result<(), String> {
        if self.microphone_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err("NotAllowedError".to_string())
        }
    }
}

pub struct ScriptedManual(pub Option<&'static str>);

#[async_trait]
impl ManualInput for ScriptedManual {
    async fn prompt(&self, _message: &str) -> Option<String> {
        self.0.map(str::to_string)
    }
}

/// Records every utterance. In hold mode an utterance plays until `cancel`.
#[derive(Default)]
pub struct FakeSpeechPlatform {
    pub unavailable: AtomicBool,
    pub hold: AtomicBool,
    pub fail_with: Mutex<Option<&'static str>>,
    utterances: Mutex<Vec<Utterance>>,
    pending: Mutex<Vec<mpsc::UnboundedSender<UtteranceEvent>>>,
    speaking: AtomicBool,
    pub cancels: AtomicUsize,
}

impl FakeSpeechPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn holding() -> Arc<Self> {
        let platform = Self::default();
        platform.hold.store(true, Ordering::SeqCst);
        Arc::new(platform)
    }

    pub fn failing(code: &'static str) -> Arc<Self> {
        let platform = Self::default();
        *platform.fail_with.lock().unwrap() = Some(code);
        Arc::new(platform)
    }

    pub fn utterances(&self) -> Vec<Utterance> {
        self.utterances.lock().unwrap().clone()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.utterances().into_iter().map(|u| u.text).collect()
    }

    /// End every held utterance normally.
    pub fn finish_pending(&self) {
        for tx in self.pending.lock().unwrap().drain(..) {
            let _ = tx.send(UtteranceEvent::End);
        }
        self.speaking.store(false, Ordering::SeqCst);
    }
}

impl SpeechPlatform for FakeSpeechPlatform {
    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    fn speak(&self, utterance: Utterance) -> Result<mpsc::UnboundedReceiver<UtteranceEvent>, String> {
        self.utterances.lock().unwrap().push(utterance);
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(UtteranceEvent::Start);
        if let Some(code) = *self.fail_with.lock().unwrap() {
            let _ = tx.send(UtteranceEvent::Error(code.to_string()));
        } else if self.hold.load(Ordering::SeqCst) {
            self.speaking.store(true, Ordering::SeqCst);
            self.pending.lock().unwrap().push(tx);
        } else {
            let _ = tx.send(UtteranceEvent::End);
        }
        Ok(rx)
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        for tx in self.pending.lock().unwrap().drain(..) {
            let _ = tx.send(UtteranceEvent::Error("interrupted".to_string()));
        }
        self.speaking.store(false, Ordering::SeqCst);
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }
}

pub struct ScriptedBackend {
    pub auth: Result<bool, BackendError>,
    pub report: Result<ReportLookup, BackendError>,
    pub answer: Result<Option<String>, BackendError>,
    pub calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            auth: Ok(true),
            report: Ok(ReportLookup::NotFound { employee_name: None }),
            answer: Ok(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CrmBackend for ScriptedBackend {
    async fn check_auth(&self) -> Result<bool, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.auth.clone()
    }

    async fn lookup_report(&self, _text: &str, _name: &str) -> Result<ReportLookup, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.report.clone()
    }

    async fn ask(&self, _text: &str) -> Result<Option<String>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

pub fn persian_voices() -> SharedVoiceCatalog {
    SharedVoiceCatalog::new(vec![
        PlatformVoice::new("Alex", "en-US"),
        PlatformVoice::new("Dilara", "fa-IR"),
    ])
}

pub fn synthesizer(platform: Arc<FakeSpeechPlatform>, catalog: SharedVoiceCatalog) -> ResponseSynthesizer {
    ResponseSynthesizer::new(platform, Arc::new(catalog), SynthesisConfig::default())
}

/// Everything an orchestrator test needs to inspect afterwards.
pub struct Rig {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub platform: Arc<FakeSpeechPlatform>,
    pub backend: Arc<ScriptedBackend>,
}

pub fn rig(
    recognizer: Arc<ScriptedRecognizer>,
    manual: Option<ScriptedManual>,
    platform: Arc<FakeSpeechPlatform>,
    backend: ScriptedBackend,
) -> Rig {
    crm_voice::logging::init_test_tracing();
    let backend = Arc::new(backend);
    let mut capture = SpeechCapture::new(recognizer.clone(), CaptureConfig::default());
    if let Some(manual) = manual {
        capture = capture.with_manual_input(Arc::new(manual));
    }
    let orchestrator = SessionOrchestrator::new(
        capture,
        CommandProcessor::new(backend.clone()),
        synthesizer(platform.clone(), persian_voices()),
    );
    Rig {
        orchestrator: Arc::new(orchestrator),
        recognizer,
        platform,
        backend,
    }
}

/// Let spawned tasks run until `done` holds.
pub async fn settle(mut done: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}
