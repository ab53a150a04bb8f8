//! Platform seams - the speech capabilities the pipeline consumes.
//!
//! The host (browser bridge, desktop shell, test harness) implements these traits.
//! Each recognition or utterance gets its own event channel; the pipeline drops the
//! receiver when the attempt settles, so a late callback from a cancelled attempt
//! has nowhere to land.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

/// Parameters for one recognition attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionRequest {
    pub language: String,
    pub interim_results: bool,
    /// Single-shot: the platform ends the recognition after one utterance.
    pub continuous: bool,
    pub max_alternatives: u8,
}

/// One candidate transcript for a recognised phrase.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionAlternative {
    pub transcript: String,
    pub confidence: f32,
}

/// Events delivered by the recognizer during one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Start,
    Result {
        is_final: bool,
        alternatives: Vec<RecognitionAlternative>,
    },
    /// Categorical error code (`network`, `not-allowed`, `no-speech`, ...).
    Error(String),
    End,
}

/// Control surface of a live recognition.
pub trait RecognitionControl: Send + Sync {
    /// Stop listening and deliver whatever was heard.
    fn stop(&self);
    /// Stop listening and discard.
    fn abort(&self);
}

/// A started recognition: its event stream and its control handle.
pub struct RecognitionHandle {
    pub events: mpsc::UnboundedReceiver<RecognitionEvent>,
    pub control: Arc<dyn RecognitionControl>,
}

/// Platform speech-recognition capability.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn is_available(&self) -> bool;

    /// Begin one recognition. Events are delivered on the returned handle.
    fn start(&self, request: RecognitionRequest) -> Result<RecognitionHandle, String>;

    /// Acquire the input device and release it immediately.
    async fn probe_microphone(&self) -> Result<(), String>;
}

/// Typed-text fallback when spoken capture is unavailable.
#[async_trait]
pub trait ManualInput: Send + Sync {
    /// Ask the user for text. `None` means the user declined.
    async fn prompt(&self, message: &str) -> Option<String>;
}

/// A voice exposed by the synthesis platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformVoice {
    pub name: String,
    /// BCP 47 tag, e.g. `fa-IR`.
    pub lang: String,
    pub voice_uri: String,
    pub local_service: bool,
    pub is_default: bool,
}

impl PlatformVoice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            voice_uri: name.clone(),
            name,
            lang: lang.into(),
            local_service: true,
            is_default: false,
        }
    }
}

/// One synthesis request; the pipeline sends one per chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<PlatformVoice>,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Events delivered for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum UtteranceEvent {
    Start,
    End,
    /// Categorical error code (`canceled`, `interrupted`, `network`, `synthesis-failed`, ...).
    Error(String),
}

/// Platform speech-synthesis capability.
pub trait SpeechPlatform: Send + Sync {
    fn is_available(&self) -> bool;

    /// Queue an utterance. Events are delivered on the returned receiver.
    fn speak(&self, utterance: Utterance) -> Result<mpsc::UnboundedReceiver<UtteranceEvent>, String>;

    /// Drop the current and all queued utterances.
    fn cancel(&self);

    fn is_speaking(&self) -> bool;
}

/// Read-only view of the platform's voice list.
pub trait VoiceCatalog: Send + Sync {
    fn voices(&self) -> Vec<PlatformVoice>;
}

/// Voice list snapshot, replaced whenever the platform reports a voice-list change.
#[derive(Debug, Clone, Default)]
pub struct SharedVoiceCatalog {
    voices: Arc<RwLock<Vec<PlatformVoice>>>,
}

impl SharedVoiceCatalog {
    pub fn new(voices: Vec<PlatformVoice>) -> Self {
        Self {
            voices: Arc::new(RwLock::new(voices)),
        }
    }

    /// Call from the platform's voices-changed handler.
    pub fn replace(&self, voices: Vec<PlatformVoice>) {
        let mut guard = self.voices.write().unwrap_or_else(|e| e.into_inner());
        *guard = voices;
    }

    pub fn len(&self) -> usize {
        self.voices.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VoiceCatalog for SharedVoiceCatalog {
    fn voices(&self) -> Vec<PlatformVoice> {
        self.voices.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
