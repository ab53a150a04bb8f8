//! ResponseSynthesizer - speak a response without overwhelming the engine.
//!
//! Pipeline per `speak` call: summarize (long inputs) → preprocess → chunk →
//! select voice → play chunks one utterance at a time with a pause between them.
//! Cancellation and interruption resolve `speak` normally; only genuine engine
//! failures are errors.

use crate::config::SynthesisConfig;
use crate::error::SynthesisError;
use crate::platform::{PlatformVoice, SpeechPlatform, Utterance, UtteranceEvent, VoiceCatalog};
use crate::text::{char_len, chunk_text, preprocess_for_speech, summarize};
use crate::voices::{in_family, select_voice, utterance_language, SelectionReason};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What will actually be spoken for a given input.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechPlan {
    /// True when the input exceeded the summary threshold.
    pub summarized: bool,
    /// Summarized (or original, trimmed) text before speech preprocessing.
    pub source: String,
    pub chunks: Vec<String>,
}

/// Diagnostic snapshot of the voice list and current choice.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceInfo {
    pub supported: bool,
    pub total_voices: usize,
    pub primary_voices: Vec<String>,
    pub secondary_voices: Vec<String>,
    pub selected: Option<PlatformVoice>,
    pub selection_reason: Option<SelectionReason>,
}

enum UtteranceFailure {
    /// Stop or interruption; not an error.
    Cancelled,
    Failed(SynthesisError),
}

fn classify_utterance_error(code: &str) -> UtteranceFailure {
    match code {
        "canceled" | "cancelled" | "interrupted" => UtteranceFailure::Cancelled,
        "network" => UtteranceFailure::Failed(SynthesisError::Network),
        "synthesis-unavailable" | "audio-hardware" => {
            UtteranceFailure::Failed(SynthesisError::Unavailable)
        }
        other => UtteranceFailure::Failed(SynthesisError::SynthesisFailed(other.to_string())),
    }
}

/// Position of the utterance currently owned by a `speak` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UtteranceTicket {
    generation: u64,
    index: usize,
}

#[derive(Default)]
struct SpeakSlot {
    generation: u64,
    speaking: bool,
    cancel: Option<CancellationToken>,
    current: Option<UtteranceTicket>,
    selected: Option<(PlatformVoice, SelectionReason)>,
}

pub struct ResponseSynthesizer {
    platform: Arc<dyn SpeechPlatform>,
    catalog: Arc<dyn VoiceCatalog>,
    config: SynthesisConfig,
    slot: Mutex<SpeakSlot>,
}

struct SpeakGuard<'a> {
    synth: &'a ResponseSynthesizer,
    generation: u64,
}

impl Drop for SpeakGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.synth.lock_slot();
        if slot.generation == self.generation {
            slot.speaking = false;
            slot.cancel = None;
            slot.current = None;
        }
    }
}

impl ResponseSynthesizer {
    pub fn new(
        platform: Arc<dyn SpeechPlatform>,
        catalog: Arc<dyn VoiceCatalog>,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            platform,
            catalog,
            config,
            slot: Mutex::new(SpeakSlot::default()),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, SpeakSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_supported(&self) -> bool {
        self.platform.is_available()
    }

    pub fn is_speaking(&self) -> bool {
        self.lock_slot().speaking || self.platform.is_speaking()
    }

    /// Summarize, preprocess and chunk without playing anything.
    pub fn prepare(&self, text: &str) -> SpeechPlan {
        let trimmed = text.trim();
        let summarized = char_len(trimmed) > self.config.summary_threshold;
        let source = if summarized {
            let summary = summarize(trimmed, self.config.summary_max_len);
            info!(
                target: "crm::voice",
                original = char_len(trimmed),
                summary = char_len(&summary),
                "Response summarized for speech"
            );
            summary
        } else {
            trimmed.to_string()
        };
        let spoken = preprocess_for_speech(&source);
        let chunks = chunk_text(&spoken, self.config.max_chunk_len);
        SpeechPlan {
            summarized,
            source,
            chunks,
        }
    }

    fn choose_voice(&self) -> Option<(PlatformVoice, SelectionReason)> {
        let voices = self.catalog.voices();
        select_voice(
            &voices,
            &self.config.primary_family,
            &self.config.secondary_family,
        )
    }

    /// Claim the output, superseding any playback still running. The returned
    /// token is a child of `parent`, so a parent cancelled earlier is already seen.
    fn begin(
        &self,
        selected: Option<(PlatformVoice, SelectionReason)>,
        parent: &CancellationToken,
    ) -> (u64, CancellationToken) {
        let mut slot = self.lock_slot();
        let superseded = slot.cancel.take();
        let was_speaking = slot.speaking;
        slot.generation += 1;
        slot.speaking = true;
        slot.current = None;
        slot.selected = selected;
        let token = parent.child_token();
        slot.cancel = Some(token.clone());
        let generation = slot.generation;
        drop(slot);

        if let Some(previous) = superseded {
            previous.cancel();
        }
        if was_speaking {
            self.platform.cancel();
        }
        (generation, token)
    }

    fn attach(&self, ticket: UtteranceTicket) -> bool {
        let mut slot = self.lock_slot();
        if slot.generation != ticket.generation {
            return false;
        }
        slot.current = Some(ticket);
        true
    }

    fn is_attached(&self, ticket: UtteranceTicket) -> bool {
        self.lock_slot().current == Some(ticket)
    }

    /// Speak `text`. Resolves when playback finishes, is stopped or is interrupted.
    pub async fn speak(&self, text: &str) -> Result<(), SynthesisError> {
        self.speak_with(text, &CancellationToken::new()).await
    }

    /// [`speak`](Self::speak) bound to a caller's token: cancelling `parent` at
    /// any point, even before playback begins, stops this call.
    pub async fn speak_with(&self, text: &str, parent: &CancellationToken) -> Result<(), SynthesisError> {
        if !self.platform.is_available() {
            return Err(SynthesisError::Unavailable);
        }
        let plan = self.prepare(text);
        if plan.chunks.is_empty() {
            debug!(target: "crm::voice", "Nothing to speak");
            return Ok(());
        }

        let selected = self.choose_voice();
        let voice = selected.as_ref().map(|(v, _)| v.clone());
        let lang = utterance_language(
            voice.as_ref(),
            &self.config.primary_family,
            &self.config.secondary_family,
            &self.config.neutral_language,
            &self.config.default_language,
        );
        match &selected {
            Some((v, reason)) => {
                info!(target: "crm::voice", voice = %v.name, voice_lang = %v.lang, ?reason, %lang, "Voice selected")
            }
            None => info!(target: "crm::voice", %lang, "No voices listed, using platform default"),
        }

        let (generation, cancel) = self.begin(selected, parent);
        let _guard = SpeakGuard {
            synth: self,
            generation,
        };

        let total = plan.chunks.len();
        for (index, chunk) in plan.chunks.into_iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(self.config.chunk_pause()) => {}
                }
            }
            if cancel.is_cancelled() {
                return Ok(());
            }

            let ticket = UtteranceTicket { generation, index };
            if !self.attach(ticket) {
                return Ok(());
            }
            debug!(target: "crm::voice", chunk = index + 1, total, len = char_len(&chunk), "Speaking chunk");

            let utterance = Utterance {
                text: chunk,
                voice: voice.clone(),
                lang: lang.clone(),
                rate: self.config.rate,
                pitch: self.config.pitch,
                volume: self.config.volume,
            };
            let mut events = self
                .platform
                .speak(utterance)
                .map_err(SynthesisError::SynthesisFailed)?;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    event = events.recv() => match event {
                        Some(UtteranceEvent::Start) => {}
                        Some(UtteranceEvent::End) | None => break,
                        Some(UtteranceEvent::Error(code)) => {
                            if !self.is_attached(ticket) {
                                debug!(target: "crm::voice", %code, "Ignoring error from detached utterance");
                                return Ok(());
                            }
                            match classify_utterance_error(&code) {
                                UtteranceFailure::Cancelled => {
                                    info!(target: "crm::voice", %code, "Playback stopped");
                                    return Ok(());
                                }
                                UtteranceFailure::Failed(e) => {
                                    warn!(target: "crm::voice", %code, chunk = index + 1, "Synthesis failed");
                                    return Err(e);
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Cancel playback now and discard pending chunks. The current utterance
    /// stays attached until its `speak` call settles.
    pub fn stop(&self) {
        let token = {
            let mut slot = self.lock_slot();
            slot.speaking = false;
            slot.cancel.take()
        };
        if let Some(token) = token {
            token.cancel();
        }
        self.platform.cancel();
    }

    /// Detach the current utterance, then [`stop`](Self::stop). A late error
    /// callback from the detached utterance is ignored instead of being
    /// attributed to whatever speaks next.
    pub fn stop_gracefully(&self) {
        self.lock_slot().current = None;
        self.stop();
    }

    pub fn get_voice_info(&self) -> VoiceInfo {
        let voices = self.catalog.voices();
        let names_in = |family: &str| {
            voices
                .iter()
                .filter(|v| in_family(&v.lang, family))
                .map(|v| v.name.clone())
                .collect::<Vec<_>>()
        };
        let selected = self
            .lock_slot()
            .selected
            .clone()
            .or_else(|| self.choose_voice());
        VoiceInfo {
            supported: self.platform.is_available(),
            total_voices: voices.len(),
            primary_voices: names_in(&self.config.primary_family),
            secondary_voices: names_in(&self.config.secondary_family),
            selection_reason: selected.as_ref().map(|(_, r)| *r),
            selected: selected.map(|(v, _)| v),
        }
    }
}
