//! SpeechCapture - one finalized transcript per call.
//!
//! Wraps the platform recognizer with a watchdog per attempt, a bounded retry
//! budget for network failures and a language fallback chain for
//! `language-not-supported`. Interim transcripts are published on a watch
//! channel and never resolve the call.
//!
//! The retry budget is shared by the whole `start_listening` call, fallback
//! languages included: a flaky network cannot multiply retries by walking the
//! fallback chain.

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::platform::{
    ManualInput, RecognitionAlternative, RecognitionControl, RecognitionEvent, RecognitionHandle,
    RecognitionRequest, SpeechRecognizer,
};
use crate::text::normalize_transcript;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MANUAL_PROMPT: &str = "لطفاً دستور خود را تایپ کنید:";

#[derive(Default)]
struct CaptureSlot {
    /// Bumped on every claim; stale guards compare against it.
    generation: u64,
    listening: bool,
    cancel: Option<CancellationToken>,
    live: Option<Arc<dyn RecognitionControl>>,
}

/// Network retries left for one `start_listening` call.
#[derive(Debug)]
struct RetryBudget {
    used: u32,
    max: u32,
}

impl RetryBudget {
    fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    fn try_take(&mut self) -> bool {
        if self.used < self.max {
            self.used += 1;
            true
        } else {
            false
        }
    }
}

pub struct SpeechCapture {
    recognizer: Arc<dyn SpeechRecognizer>,
    manual: Option<Arc<dyn ManualInput>>,
    config: CaptureConfig,
    slot: Mutex<CaptureSlot>,
    interim_tx: watch::Sender<String>,
}

/// Releases the listening claim when the call settles or its future is dropped.
struct ListenGuard<'a> {
    capture: &'a SpeechCapture,
    generation: u64,
}

impl Drop for ListenGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.capture.lock_slot();
        if slot.generation == self.generation {
            slot.listening = false;
            slot.cancel = None;
            slot.live = None;
        }
    }
}

/// Clears the live recognition handle when an attempt settles.
struct LiveGuard<'a> {
    capture: &'a SpeechCapture,
    generation: u64,
}

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.capture.lock_slot();
        if slot.generation == self.generation {
            slot.live = None;
        }
    }
}

impl SpeechCapture {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, config: CaptureConfig) -> Self {
        let (interim_tx, _) = watch::channel(String::new());
        Self {
            recognizer,
            manual: None,
            config,
            slot: Mutex::new(CaptureSlot::default()),
            interim_tx,
        }
    }

    /// Attach the typed-text fallback.
    pub fn with_manual_input(mut self, manual: Arc<dyn ManualInput>) -> Self {
        self.set_manual_input(manual);
        self
    }

    pub fn set_manual_input(&mut self, manual: Arc<dyn ManualInput>) {
        self.manual = Some(manual);
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_available()
    }

    pub fn has_manual_input(&self) -> bool {
        self.manual.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.lock_slot().listening
    }

    /// Latest interim transcript of the running capture (advisory only).
    pub fn interim(&self) -> watch::Receiver<String> {
        self.interim_tx.subscribe()
    }

    fn lock_slot(&self) -> MutexGuard<'_, CaptureSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn claim(&self, parent: &CancellationToken) -> Result<(u64, CancellationToken), CaptureError> {
        let mut slot = self.lock_slot();
        if slot.listening {
            return Err(CaptureError::AlreadyActive);
        }
        slot.generation += 1;
        slot.listening = true;
        let token = parent.child_token();
        slot.cancel = Some(token.clone());
        slot.live = None;
        Ok((slot.generation, token))
    }

    /// Listen for one utterance and return its normalized final transcript.
    pub async fn start_listening(&self) -> Result<String, CaptureError> {
        self.start_listening_with(&CancellationToken::new()).await
    }

    /// [`start_listening`](Self::start_listening) bound to a caller's token.
    /// Cancelling `parent` before the recognizer starts still aborts the call.
    pub async fn start_listening_with(&self, parent: &CancellationToken) -> Result<String, CaptureError> {
        if !self.recognizer.is_available() {
            return Err(CaptureError::Unsupported);
        }
        let (generation, cancel) = self.claim(parent)?;
        let _release = ListenGuard {
            capture: self,
            generation,
        };
        self.interim_tx.send_replace(String::new());

        info!(target: "crm::voice", language = %self.config.language, "Listening");
        let mut budget = RetryBudget::new(self.config.max_network_retries);
        let result = match self
            .listen_with_retry(
                &self.config.language,
                self.config.timeout(),
                &mut budget,
                &cancel,
                generation,
            )
            .await
        {
            Err(CaptureError::LanguageUnsupported) => {
                warn!(target: "crm::voice", language = %self.config.language, "Primary language rejected, walking fallback chain");
                self.language_fallback(&mut budget, &cancel, generation).await
            }
            other => other,
        };

        match &result {
            Ok(transcript) => info!(target: "crm::voice", %transcript, "Transcript captured"),
            Err(e) => warn!(target: "crm::voice", error = %e, retries = budget.used, "Capture failed"),
        }
        result
    }

    async fn listen_with_retry(
        &self,
        language: &str,
        timeout: Duration,
        budget: &mut RetryBudget,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Result<String, CaptureError> {
        loop {
            match self.attempt(language, timeout, cancel, generation).await {
                Err(e) if e.is_retryable() && budget.try_take() => {
                    warn!(
                        target: "crm::voice",
                        error = %e,
                        attempt = budget.used,
                        max = budget.max,
                        "Recognition failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(CaptureError::Aborted),
                        _ = tokio::time::sleep(self.config.retry_delay()) => {}
                    }
                }
                other => return other,
            }
        }
    }

    async fn language_fallback(
        &self,
        budget: &mut RetryBudget,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Result<String, CaptureError> {
        for language in &self.config.fallback_languages {
            info!(target: "crm::voice", %language, "Trying fallback language");
            match self
                .listen_with_retry(language, self.config.fallback_timeout(), budget, cancel, generation)
                .await
            {
                Ok(transcript) => return Ok(transcript),
                Err(e @ (CaptureError::LanguageUnsupported | CaptureError::Timeout)) => {
                    warn!(target: "crm::voice", %language, error = %e, "Fallback language failed");
                }
                Err(e) => return Err(e),
            }
        }
        Err(CaptureError::LanguageUnsupported)
    }

    /// One recognition under its own watchdog.
    async fn attempt(
        &self,
        language: &str,
        timeout: Duration,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Result<String, CaptureError> {
        if cancel.is_cancelled() {
            return Err(CaptureError::Aborted);
        }
        let request = RecognitionRequest {
            language: language.to_string(),
            interim_results: true,
            continuous: false,
            max_alternatives: self.config.max_alternatives,
        };
        let RecognitionHandle {
            mut events,
            control,
        } = self.recognizer.start(request).map_err(CaptureError::Platform)?;

        {
            let mut slot = self.lock_slot();
            if slot.generation != generation {
                control.abort();
                return Err(CaptureError::Aborted);
            }
            slot.live = Some(Arc::clone(&control));
        }
        let _live = LiveGuard {
            capture: self,
            generation,
        };

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut final_transcript = String::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    control.abort();
                    return Err(CaptureError::Aborted);
                }
                _ = &mut deadline => {
                    warn!(target: "crm::voice", %language, timeout_ms = timeout.as_millis() as u64, "Recognition watchdog fired");
                    control.stop();
                    return Err(CaptureError::Timeout);
                }
                event = events.recv() => match event {
                    Some(RecognitionEvent::Start) => {
                        debug!(target: "crm::voice", %language, "Recognition started");
                    }
                    Some(RecognitionEvent::Result { is_final, alternatives }) => {
                        let Some(best) = best_alternative(&alternatives) else { continue };
                        if is_final {
                            if !final_transcript.is_empty() {
                                final_transcript.push(' ');
                            }
                            final_transcript.push_str(best);
                            let normalized = normalize_transcript(&final_transcript);
                            if !normalized.is_empty() {
                                return Ok(normalized);
                            }
                        } else {
                            debug!(target: "crm::voice", interim = %best, "Interim transcript");
                            self.interim_tx.send_replace(best.to_string());
                        }
                    }
                    Some(RecognitionEvent::Error(code)) => {
                        return Err(CaptureError::from_code(&code));
                    }
                    Some(RecognitionEvent::End) | None => {
                        return Err(CaptureError::NoSpeech);
                    }
                }
            }
        }
    }

    /// Cancel the running capture, if any. Idempotent.
    pub fn stop(&self) {
        let mut slot = self.lock_slot();
        if let Some(token) = slot.cancel.take() {
            token.cancel();
        }
        if let Some(live) = slot.live.take() {
            live.abort();
        }
        if slot.listening {
            info!(target: "crm::voice", "Capture stopped");
        }
        slot.listening = false;
    }

    /// Acquire the microphone and release it. Never fails; problems yield `false`.
    pub async fn test_microphone(&self) -> bool {
        match self.recognizer.probe_microphone().await {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "crm::voice", error = %e, "Microphone probe failed");
                false
            }
        }
    }

    /// Typed-text fallback for when spoken capture is unavailable.
    pub async fn get_manual_input(&self) -> Result<String, CaptureError> {
        let manual = self.manual.as_ref().ok_or(CaptureError::Unsupported)?;
        match manual.prompt(MANUAL_PROMPT).await {
            None => Err(CaptureError::ManualInputCancelled),
            Some(text) => {
                let text = normalize_transcript(&text);
                if text.is_empty() {
                    Err(CaptureError::ManualInputEmpty)
                } else {
                    Ok(text)
                }
            }
        }
    }
}

/// Highest-confidence non-blank transcript; earlier entries win ties.
fn best_alternative(alternatives: &[RecognitionAlternative]) -> Option<&str> {
    let mut best: Option<&RecognitionAlternative> = None;
    for alt in alternatives.iter().filter(|a| !a.transcript.trim().is_empty()) {
        if best.map_or(true, |b| alt.confidence > b.confidence) {
            best = Some(alt);
        }
    }
    best.map(|a| a.transcript.as_str())
}
