//! Error types for the CRM voice pipeline

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while obtaining a transcript from the user
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("speech recognition is not supported on this platform")]
    Unsupported,

    #[error("a capture is already in progress")]
    AlreadyActive,

    #[error("capture timed out")]
    Timeout,

    #[error("network error during speech recognition")]
    Network,

    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no speech detected")]
    NoSpeech,

    #[error("audio capture device failure")]
    AudioCapture,

    #[error("recognition language not supported")]
    LanguageUnsupported,

    #[error("manual input cancelled")]
    ManualInputCancelled,

    #[error("manual input was empty")]
    ManualInputEmpty,

    #[error("capture aborted")]
    Aborted,

    #[error("speech recognition error: {0}")]
    Platform(String),
}

impl CaptureError {
    /// Map a platform recognition error code onto the taxonomy.
    pub fn from_code(code: &str) -> Self {
        match code {
            "network" => CaptureError::Network,
            "not-allowed" | "service-not-allowed" | "permission-denied" => {
                CaptureError::PermissionDenied
            }
            "no-speech" => CaptureError::NoSpeech,
            "audio-capture" => CaptureError::AudioCapture,
            "language-not-supported" => CaptureError::LanguageUnsupported,
            "aborted" => CaptureError::Aborted,
            other => CaptureError::Platform(other.to_string()),
        }
    }

    /// Only network failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::Network)
    }

    /// Speakable message shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            CaptureError::Unsupported => "مرورگر شما از تشخیص گفتار پشتیبانی نمی‌کند.",
            CaptureError::AlreadyActive => "در حال حاضر در حال گوش دادن هستم.",
            CaptureError::Timeout => "زمان گوش دادن به پایان رسید. لطفاً دوباره تلاش کنید.",
            CaptureError::Network => "خطا در اتصال شبکه. لطفاً اتصال اینترنت خود را بررسی کنید.",
            CaptureError::PermissionDenied => {
                "دسترسی به میکروفون رد شد. لطفاً اجازه دسترسی به میکروفون را بدهید."
            }
            CaptureError::NoSpeech => "صدایی تشخیص داده نشد. لطفاً واضح‌تر صحبت کنید.",
            CaptureError::AudioCapture => "خطا در دریافت صدا. لطفاً میکروفون خود را بررسی کنید.",
            CaptureError::LanguageUnsupported => "زبان فارسی در این مرورگر پشتیبانی نمی‌شود.",
            CaptureError::ManualInputCancelled => "ورودی لغو شد.",
            CaptureError::ManualInputEmpty => "متنی وارد نشد.",
            CaptureError::Aborted => "گوش دادن متوقف شد.",
            CaptureError::Platform(_) => "خطا در تشخیص گفتار. لطفاً دوباره تلاش کنید.",
        }
    }
}

/// Errors raised by the speech synthesis platform.
///
/// Cancellation and interruption are not errors: `speak` resolves for those.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("network error during speech synthesis")]
    Network,

    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("speech synthesis unavailable")]
    Unavailable,
}

impl SynthesisError {
    pub fn user_message(&self) -> &'static str {
        match self {
            SynthesisError::Network => "خطا در اتصال شبکه هنگام پخش صدا.",
            SynthesisError::SynthesisFailed(_) => "خطا در تولید صدا.",
            SynthesisError::Unavailable => "سرویس تبدیل متن به گفتار در دسترس نیست.",
        }
    }
}

/// Failures talking to the CRM backend. Absorbed by the command processor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("backend returned HTTP {status}")]
    Http {
        status: u16,
        message: Option<String>,
    },

    #[error("backend rejected request: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed backend response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Backend-reported message, when it sent one.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            BackendError::Http { message, .. } => message.as_deref(),
            BackendError::Rejected(message) => Some(message.as_str()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Malformed(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// Errors that can occur in the voice orchestration system
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("a voice session is already active")]
    Busy,

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl From<config::ConfigError> for VoiceError {
    fn from(err: config::ConfigError) -> Self {
        VoiceError::Config(err.to_string())
    }
}
