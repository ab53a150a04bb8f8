//! Voice pipeline configuration.
//!
//! Defaults match the production timings of the assistant. Load order for
//! [`VoiceConfig::load`]: built-in defaults, then the file named by
//! `CRM_VOICE_CONFIG` (default `config/voice`), then `CRM_VOICE__*` env vars.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | CRM_API_BASE_URL | http://127.0.0.1:3000/api | Backend base URL (auth, report, ask). |
//! | CRM_VOICE_LANGUAGE | fa-IR | Primary recognition language. |
//! | CRM_VOICE_HTTP_TIMEOUT_SECS | 30 | Per-request backend timeout. |

use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Speech capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Primary recognition language tag.
    pub language: String,
    /// Alternates tried in order when the primary language is rejected.
    pub fallback_languages: Vec<String>,
    /// Watchdog for one capture attempt.
    pub timeout_ms: u64,
    /// Watchdog for each fallback-language attempt.
    pub fallback_timeout_ms: u64,
    /// Network failures retried this many times per top-level listen.
    pub max_network_retries: u32,
    pub retry_delay_ms: u64,
    pub max_alternatives: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            language: "fa-IR".to_string(),
            fallback_languages: vec!["fa".to_string(), "ar-SA".to_string(), "en-US".to_string()],
            timeout_ms: 30_000,
            fallback_timeout_ms: 10_000,
            max_network_retries: 3,
            retry_delay_ms: 2_000,
            max_alternatives: 3,
        }
    }
}

impl CaptureConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Speech synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Language family prefix preferred for voices ("fa").
    pub primary_family: String,
    /// Phonetically related family used when no primary voice exists ("ar").
    pub secondary_family: String,
    /// Tag applied when the chosen voice belongs to neither family.
    pub neutral_language: String,
    /// Tag applied when the platform default voice is used.
    pub default_language: String,
    /// Responses longer than this are summarised before speaking.
    pub summary_threshold: usize,
    /// Upper bound for the generic (non-report) summary.
    pub summary_max_len: usize,
    pub max_chunk_len: usize,
    pub chunk_pause_ms: u64,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            primary_family: "fa".to_string(),
            secondary_family: "ar".to_string(),
            neutral_language: "en-US".to_string(),
            default_language: "fa-IR".to_string(),
            summary_threshold: 500,
            summary_max_len: 300,
            max_chunk_len: 150,
            chunk_pause_ms: 500,
            rate: 0.9,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

impl SynthesisConfig {
    pub fn chunk_pause(&self) -> Duration {
        Duration::from_millis(self.chunk_pause_ms)
    }
}

/// CRM backend endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub auth_check_path: String,
    pub report_path: String,
    pub ask_path: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000/api".to_string(),
            auth_check_path: "/auth/check".to_string(),
            report_path: "/ai/report".to_string(),
            ask_path: "/ai/ask".to_string(),
            timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Complete configuration for the voice pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub capture: CaptureConfig,
    pub synthesis: SynthesisConfig,
    pub backend: BackendConfig,
}

impl VoiceConfig {
    /// Load from file and environment. Precedence: env `CRM_VOICE__*` > file > defaults.
    pub fn load() -> VoiceResult<Self> {
        let config_path =
            std::env::var("CRM_VOICE_CONFIG").unwrap_or_else(|_| "config/voice".to_string());
        let defaults = config::Config::try_from(&VoiceConfig::default())?;
        let builder = config::Config::builder().add_source(defaults);

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder.add_source(config::File::with_name(&config_path).required(false))
        };

        let built = builder
            .add_source(config::Environment::with_prefix("CRM_VOICE").separator("__"))
            .build()?;

        let cfg: VoiceConfig = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus the flat env overrides. Unset or invalid values keep the default.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(url) = env_opt_string("CRM_API_BASE_URL") {
            cfg.backend.base_url = url;
        }
        if let Some(lang) = env_opt_string("CRM_VOICE_LANGUAGE") {
            cfg.capture.language = lang;
        }
        if let Some(secs) = env_opt_string("CRM_VOICE_HTTP_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&n| n > 0)
        {
            cfg.backend.timeout_secs = secs;
        }
        cfg
    }

    pub fn validate(&self) -> VoiceResult<()> {
        if self.capture.language.trim().is_empty() {
            return Err(VoiceError::Config("capture.language must not be empty".to_string()));
        }
        if self.synthesis.max_chunk_len == 0 {
            return Err(VoiceError::Config("synthesis.max_chunk_len must be > 0".to_string()));
        }
        if self.synthesis.summary_max_len > self.synthesis.summary_threshold {
            return Err(VoiceError::Config(format!(
                "synthesis.summary_max_len ({}) must not exceed summary_threshold ({})",
                self.synthesis.summary_max_len, self.synthesis.summary_threshold
            )));
        }
        if self.synthesis.summary_max_len < 4 {
            return Err(VoiceError::Config("synthesis.summary_max_len must be >= 4".to_string()));
        }
        Ok(())
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_constants() {
        let cfg = VoiceConfig::default();
        assert_eq!(cfg.capture.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.capture.fallback_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.capture.max_network_retries, 3);
        assert_eq!(cfg.capture.retry_delay(), Duration::from_secs(2));
        assert_eq!(cfg.capture.fallback_languages.len(), 3);
        assert_eq!(cfg.synthesis.summary_threshold, 500);
        assert_eq!(cfg.synthesis.summary_max_len, 300);
        assert_eq!(cfg.synthesis.max_chunk_len, 150);
        assert_eq!(cfg.synthesis.chunk_pause(), Duration::from_millis(500));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_chunk() {
        let mut cfg = VoiceConfig::default();
        cfg.synthesis.max_chunk_len = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backend_url_joins_without_double_slash() {
        let mut cfg = BackendConfig::default();
        cfg.base_url = "http://crm.local/api/".to_string();
        assert_eq!(cfg.url("/auth/check"), "http://crm.local/api/auth/check");
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let cfg: VoiceConfig = serde_json::from_str(r#"{"capture": {"language": "fa"}}"#).unwrap();
        assert_eq!(cfg.capture.language, "fa");
        assert_eq!(cfg.capture.max_network_retries, 3);
        assert_eq!(cfg.synthesis.max_chunk_len, 150);
    }
}
