//! Session Orchestrator - one guarded round trip per call
//!
//! Ties capture, classification, processing and synthesis into a single
//! listen → classify → process → speak session:
//!
//! - At most one session is alive per orchestrator. A second call is rejected
//!   with [`VoiceError::Busy`] before any capture or synthesis happens.
//! - Every failure downstream becomes a structured [`InteractionOutcome`] with a
//!   speakable error response; nothing is thrown at the caller.
//! - [`SessionOrchestrator::stop_audio_processing`] is the only cancellation path.

use crate::backend::CrmBackend;
use crate::capture::SpeechCapture;
use crate::classifier::CommandClassifier;
use crate::config::VoiceConfig;
use crate::error::{CaptureError, VoiceError, VoiceResult};
use crate::platform::{ManualInput, SpeechPlatform, SpeechRecognizer, VoiceCatalog};
use crate::processor::{messages, AiResponse, CommandProcessor};
use crate::synthesizer::ResponseSynthesizer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Phase of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Listening,
    Classifying,
    Processing,
    Speaking,
    Failed,
}

impl SessionState {
    /// Forward edges of the session state machine. Forced resets to `Idle`
    /// (cleanup and stop) bypass this check.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Listening)
                | (Listening, Classifying)
                | (Listening, Failed)
                | (Classifying, Processing)
                | (Processing, Speaking)
                | (Processing, Failed)
                | (Speaking, Idle)
                | (Speaking, Failed)
                | (Failed, Idle)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Classifying => "classifying",
            SessionState::Processing => "processing",
            SessionState::Speaking => "speaking",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The single live round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
}

/// What a session produced. `transcript` is empty on failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionOutcome {
    pub transcript: String,
    pub response: AiResponse,
    pub success: bool,
}

impl InteractionOutcome {
    fn failure(message: &str) -> Self {
        Self {
            transcript: String::new(),
            response: AiResponse::error(message),
            success: false,
        }
    }
}

/// Capability report from [`SessionOrchestrator::initialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub capture_supported: bool,
    pub manual_input: bool,
    pub microphone: bool,
    pub synthesis_supported: bool,
    pub voices: usize,
}

#[derive(Default)]
struct SessionSlot {
    /// Bumped on every claim and every forced stop.
    generation: u64,
    session: Option<Session>,
    cancel: Option<CancellationToken>,
}

pub struct SessionOrchestrator {
    capture: SpeechCapture,
    classifier: CommandClassifier,
    processor: CommandProcessor,
    synthesizer: ResponseSynthesizer,
    slot: Mutex<SessionSlot>,
    state_tx: watch::Sender<SessionState>,
    sequence: AtomicU64,
}

/// Returns the orchestrator to `Idle` however the session future ends,
/// including when it is dropped before completion.
struct SessionGuard<'a> {
    orchestrator: &'a SessionOrchestrator,
    generation: u64,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.orchestrator.lock_slot();
        if slot.generation != self.generation {
            return;
        }
        slot.cancel = None;
        if let Some(session) = slot.session.take() {
            let elapsed = Utc::now() - session.started_at;
            info!(
                target: "crm::voice",
                session = %session.id,
                elapsed_ms = elapsed.num_milliseconds(),
                "Voice session ended"
            );
        }
        self.orchestrator.state_tx.send_replace(SessionState::Idle);
    }
}

impl SessionOrchestrator {
    pub fn new(
        capture: SpeechCapture,
        processor: CommandProcessor,
        synthesizer: ResponseSynthesizer,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            capture,
            classifier: CommandClassifier::new(),
            processor,
            synthesizer,
            slot: Mutex::new(SessionSlot::default()),
            state_tx,
            sequence: AtomicU64::new(0),
        }
    }

    /// Build all components from a validated configuration.
    pub fn from_config(
        config: &VoiceConfig,
        recognizer: Arc<dyn SpeechRecognizer>,
        platform: Arc<dyn SpeechPlatform>,
        catalog: Arc<dyn VoiceCatalog>,
        backend: Arc<dyn CrmBackend>,
    ) -> VoiceResult<Self> {
        config.validate()?;
        Ok(Self::new(
            SpeechCapture::new(recognizer, config.capture.clone()),
            CommandProcessor::new(backend),
            ResponseSynthesizer::new(platform, catalog, config.synthesis.clone()),
        ))
    }

    /// Attach the typed-text fallback used when speech recognition is unsupported.
    pub fn with_manual_input(mut self, manual: Arc<dyn ManualInput>) -> Self {
        self.capture.set_manual_input(manual);
        self
    }

    fn lock_slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capture(&self) -> &SpeechCapture {
        &self.capture
    }

    pub fn synthesizer(&self) -> &ResponseSynthesizer {
        &self.synthesizer
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.lock_slot().session.is_some()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.lock_slot().session.clone()
    }

    /// Probe capabilities and log what this process can do.
    pub async fn initialize(&self) -> Readiness {
        let readiness = Readiness {
            capture_supported: self.capture.is_supported(),
            manual_input: self.capture.has_manual_input(),
            microphone: self.capture.is_supported() && self.capture.test_microphone().await,
            synthesis_supported: self.synthesizer.is_supported(),
            voices: self.synthesizer.get_voice_info().total_voices,
        };
        info!(
            target: "crm::voice",
            capture = readiness.capture_supported,
            manual = readiness.manual_input,
            microphone = readiness.microphone,
            synthesis = readiness.synthesis_supported,
            voices = readiness.voices,
            "Voice pipeline initialized"
        );
        if !readiness.capture_supported && !readiness.manual_input {
            warn!(target: "crm::voice", "No capture path available");
        }
        readiness
    }

    /// Cancel any active session before the orchestrator is dropped.
    pub fn shutdown(&self) {
        self.stop_audio_processing();
        info!(target: "crm::voice", "Voice pipeline shut down");
    }

    fn claim(&self) -> VoiceResult<(u64, CancellationToken)> {
        let mut slot = self.lock_slot();
        if slot.session.is_some() {
            return Err(VoiceError::Busy);
        }
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at = Utc::now();
        let session = Session {
            id: format!("voice-{}-{}", started_at.timestamp_millis(), seq),
            started_at,
        };
        info!(target: "crm::voice", session = %session.id, "Voice session started");
        slot.generation += 1;
        slot.session = Some(session);
        let token = CancellationToken::new();
        slot.cancel = Some(token.clone());
        Ok((slot.generation, token))
    }

    /// Run one listen → classify → process → speak session.
    ///
    /// The busy check happens in this call, before the returned future is ever
    /// polled: a concurrent caller gets [`VoiceError::Busy`] with no capture or
    /// synthesis side effects.
    ///
    /// ```ignore
    /// let outcome = orchestrator.handle_voice_interaction()?.await;
    /// ```
    pub fn handle_voice_interaction(
        &self,
    ) -> VoiceResult<impl Future<Output = InteractionOutcome> + '_> {
        let (generation, cancel) = self.claim()?;
        let guard = SessionGuard {
            orchestrator: self,
            generation,
        };
        Ok(async move {
            let _guard = guard;
            self.run_session(generation, &cancel).await
        })
    }

    /// Move to `next` if this session still owns the orchestrator.
    fn advance(&self, generation: u64, next: SessionState) -> VoiceResult<()> {
        let slot = self.lock_slot();
        if slot.generation != generation || slot.session.is_none() {
            return Err(VoiceError::Capture(CaptureError::Aborted));
        }
        let current = *self.state_tx.borrow();
        if !current.can_transition_to(next) {
            warn!(target: "crm::voice", from = %current, to = %next, "Rejected session transition");
            return Err(VoiceError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        debug!(target: "crm::voice", from = %current, to = %next, "Session transition");
        self.state_tx.send_replace(next);
        Ok(())
    }

    fn stopped() -> InteractionOutcome {
        InteractionOutcome::failure(CaptureError::Aborted.user_message())
    }

    /// Outcome for a session that could not advance. Losing ownership means a
    /// stop; a rejected transition is a fault and is not reported as one.
    fn abandoned(error: VoiceError) -> InteractionOutcome {
        match error {
            VoiceError::InvalidTransition { from, to } => {
                warn!(target: "crm::voice", %from, %to, "Session abandoned after invalid transition");
                InteractionOutcome::failure(messages::SESSION_FAULT)
            }
            _ => Self::stopped(),
        }
    }

    async fn run_session(&self, generation: u64, cancel: &CancellationToken) -> InteractionOutcome {
        if let Err(e) = self.advance(generation, SessionState::Listening) {
            return Self::abandoned(e);
        }
        let transcript = match self.obtain_transcript(cancel).await {
            Ok(transcript) => transcript,
            Err(e) => return self.capture_failed(generation, cancel, e).await,
        };

        if let Err(e) = self.advance(generation, SessionState::Classifying) {
            return Self::abandoned(e);
        }
        let command = self.classifier.analyze(&transcript);
        info!(
            target: "crm::voice",
            kind = ?command.command_type,
            confidence = command.confidence,
            employee = command.employee_name.as_deref().unwrap_or(""),
            "Command classified"
        );

        if let Err(e) = self.advance(generation, SessionState::Processing) {
            return Self::abandoned(e);
        }
        let response = tokio::select! {
            _ = cancel.cancelled() => return Self::stopped(),
            response = self.processor.process(&command) => response,
        };

        if let Err(e) = self.advance(generation, SessionState::Speaking) {
            return Self::abandoned(e);
        }
        if let Err(e) = self.synthesizer.speak_with(&response.text, cancel).await {
            warn!(target: "crm::voice", error = %e, "Response could not be spoken");
            let _ = self.advance(generation, SessionState::Failed);
            return InteractionOutcome::failure(e.user_message());
        }
        if cancel.is_cancelled() {
            return Self::stopped();
        }

        let _ = self.advance(generation, SessionState::Idle);
        InteractionOutcome {
            transcript,
            response,
            success: true,
        }
    }

    async fn obtain_transcript(&self, cancel: &CancellationToken) -> Result<String, CaptureError> {
        match self.capture.start_listening_with(cancel).await {
            Err(CaptureError::Unsupported) if self.capture.has_manual_input() => {
                info!(target: "crm::voice", "Speech recognition unavailable, asking for typed input");
                tokio::select! {
                    _ = cancel.cancelled() => Err(CaptureError::Aborted),
                    typed = self.capture.get_manual_input() => typed,
                }
            }
            other => other,
        }
    }

    async fn capture_failed(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        error: CaptureError,
    ) -> InteractionOutcome {
        if error == CaptureError::Aborted || cancel.is_cancelled() {
            info!(target: "crm::voice", "Session stopped during capture");
            return Self::stopped();
        }
        warn!(target: "crm::voice", error = %error, "Capture failed");
        let _ = self.advance(generation, SessionState::Failed);
        let outcome = InteractionOutcome::failure(error.user_message());

        // Best effort: the failure result is returned either way.
        if let Err(e) = self.synthesizer.speak_with(&outcome.response.text, cancel).await {
            debug!(target: "crm::voice", error = %e, "Error message could not be spoken");
        }
        outcome
    }

    /// Cancel in-flight capture and synthesis and force the state back to `Idle`.
    /// Idempotent.
    pub fn stop_audio_processing(&self) {
        let (session, token) = {
            let mut slot = self.lock_slot();
            slot.generation += 1;
            (slot.session.take(), slot.cancel.take())
        };
        if let Some(token) = token {
            token.cancel();
        }
        self.capture.stop();
        self.synthesizer.stop_gracefully();
        self.state_tx.send_replace(SessionState::Idle);
        if let Some(session) = session {
            info!(target: "crm::voice", session = %session.id, "Voice session stopped");
        }
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.stop_audio_processing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_edges() {
        use SessionState::*;
        assert!(Idle.can_transition_to(Listening));
        assert!(Listening.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Speaking.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Idle));
        assert!(Speaking.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Speaking));
        assert!(!Classifying.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Listening));
        assert!(!Listening.can_transition_to(Processing));
    }

    #[test]
    fn failure_outcome_is_speakable_error() {
        let outcome = InteractionOutcome::failure(CaptureError::NoSpeech.user_message());
        assert!(!outcome.success);
        assert!(outcome.transcript.is_empty());
        assert!(outcome.response.is_error());
        assert!(!outcome.response.text.is_empty());
    }

    #[test]
    fn invalid_transition_is_not_reported_as_stop() {
        let fault = SessionOrchestrator::abandoned(VoiceError::InvalidTransition {
            from: SessionState::Speaking.to_string(),
            to: SessionState::Listening.to_string(),
        });
        assert!(!fault.success);
        assert_eq!(fault.response.text, messages::SESSION_FAULT);
        assert_ne!(fault.response.text, CaptureError::Aborted.user_message());

        let stop = SessionOrchestrator::abandoned(VoiceError::Capture(CaptureError::Aborted));
        assert_eq!(stop.response.text, CaptureError::Aborted.user_message());
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(serde_json::to_value(SessionState::Speaking).unwrap(), "speaking");
        assert_eq!(SessionState::Classifying.to_string(), "classifying");
    }
}
