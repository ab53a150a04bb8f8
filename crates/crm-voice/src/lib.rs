//! # CRM Voice - Persian voice assistant pipeline
//!
//! One spoken request in, one spoken answer out. The platform speech services
//! and the CRM backend are injected behind traits so every stage can run
//! against scripted fakes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Session Orchestrator                         │
//! │                 (single-flight, cancellable)                      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Capture    │→ │  Classifier  │→ │  Processor   │            │
//! │  │ retry/fallbk │  │  keywords    │  │ CRM backend  │            │
//! │  └──────────────┘  └──────────────┘  └──────────────┘            │
//! │         ↑                                    ↓                    │
//! │  ┌──────────────┐                    ┌──────────────┐            │
//! │  │  Recognizer  │                    │ Synthesizer  │            │
//! │  │  / typed in  │                    │ chunk + voice│            │
//! │  └──────────────┘                    └──────────────┘            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod platform;
pub mod processor;
pub mod synthesizer;
pub mod text;
pub mod voices;

pub use backend::{CrmBackend, HttpCrmBackend, ReportLookup};
pub use capture::SpeechCapture;
pub use classifier::{CommandClassifier, CommandType, VoiceCommand};
pub use config::{BackendConfig, CaptureConfig, SynthesisConfig, VoiceConfig};
pub use error::{BackendError, CaptureError, SynthesisError, VoiceError, VoiceResult};
pub use logging::init_tracing;
pub use orchestrator::{InteractionOutcome, Readiness, Session, SessionOrchestrator, SessionState};
pub use platform::{
    ManualInput, PlatformVoice, RecognitionAlternative, RecognitionControl, RecognitionEvent,
    RecognitionHandle, RecognitionRequest, SharedVoiceCatalog, SpeechPlatform, SpeechRecognizer,
    Utterance, UtteranceEvent, VoiceCatalog,
};
pub use processor::{AiResponse, CommandProcessor, ResponseType};
pub use synthesizer::{ResponseSynthesizer, SpeechPlan, VoiceInfo};
pub use voices::SelectionReason;
