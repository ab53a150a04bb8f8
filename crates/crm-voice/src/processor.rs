//! CommandProcessor - classified command → speakable response.
//!
//! Never fails: every backend outcome, including transport errors, becomes an
//! [`AiResponse`] with non-empty plain text.

use crate::backend::{CrmBackend, ReportLookup};
use crate::classifier::{CommandType, VoiceCommand};
use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Success,
    Error,
    Info,
}

/// Uniform response handed to synthesis and returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    pub text: String,
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl AiResponse {
    pub fn success(text: impl Into<String>) -> Self {
        Self::new(text, ResponseType::Success)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(text, ResponseType::Info)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, ResponseType::Error)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    fn new(text: impl Into<String>, response_type: ResponseType) -> Self {
        let text = text.into();
        let text = if text.trim().is_empty() {
            FALLBACK_TEXT.to_string()
        } else {
            text
        };
        Self {
            text,
            response_type,
            data: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }
}

const FALLBACK_TEXT: &str = "پاسخی دریافت نشد.";

pub mod messages {
    pub const ASK_FOR_NAME: &str =
        "لطفاً نام کارمند را مشخص کنید. مثلاً بگویید: گزارش کار احمد";
    pub const SIGN_IN: &str = "برای مشاهده گزارش ابتدا وارد حساب کاربری خود شوید.";
    pub const REPORT_FAILED: &str = "خطا در دریافت گزارش.";
    pub const RETRY_QUESTION: &str =
        "پاسخ مناسبی دریافت نشد. لطفاً سوال خود را دوباره بپرسید.";
    pub const QA_UNREACHABLE: &str =
        "خطا در ارتباط با سرویس پاسخگویی. لطفاً بعداً دوباره تلاش کنید.";
    pub const SESSION_FAULT: &str = "خطایی در پردازش درخواست رخ داد. لطفاً دوباره تلاش کنید.";
    pub const NOT_UNDERSTOOD: &str = "متوجه دستور شما نشدم. می‌توانید گزارش کار یک کارمند را بخواهید یا سوال خود را بپرسید.";
}

pub struct CommandProcessor {
    backend: Arc<dyn CrmBackend>,
}

impl CommandProcessor {
    pub fn new(backend: Arc<dyn CrmBackend>) -> Self {
        Self { backend }
    }

    pub async fn process(&self, command: &VoiceCommand) -> AiResponse {
        info!(
            target: "crm::voice",
            kind = ?command.command_type,
            confidence = command.confidence,
            "Processing command"
        );
        match command.command_type {
            CommandType::Report => match command.employee_name.as_deref() {
                None => AiResponse::info(messages::ASK_FOR_NAME),
                Some(name) => self.process_report(&command.text, name).await,
            },
            CommandType::General => self.process_general(&command.text).await,
            CommandType::Unknown => AiResponse::info(messages::NOT_UNDERSTOOD),
        }
    }

    async fn process_report(&self, text: &str, name: &str) -> AiResponse {
        match self.backend.check_auth().await {
            Ok(true) => {}
            Ok(false) => return AiResponse::error(messages::SIGN_IN),
            Err(e) => {
                warn!(target: "crm::voice", error = %e, "Auth check failed");
                return AiResponse::error(messages::SIGN_IN);
            }
        }

        match self.backend.lookup_report(text, name).await {
            Ok(ReportLookup::Found {
                employee_name,
                analysis,
            }) => {
                let body = if analysis.trim().is_empty() {
                    "تحلیلی برای این کارمند ثبت نشده است.".to_string()
                } else {
                    analysis.clone()
                };
                AiResponse::success(format!("گزارش عملکرد {}: {}", employee_name, body)).with_data(
                    json!({ "employee_name": employee_name, "analysis": analysis }),
                )
            }
            Ok(ReportLookup::NotFound { employee_name }) => {
                let subject = employee_name.unwrap_or_else(|| name.to_string());
                AiResponse::info(format!("کارمندی با نام «{}» یافت نشد.", subject))
            }
            Err(BackendError::Unauthenticated) => AiResponse::error(messages::SIGN_IN),
            Err(e) => {
                warn!(target: "crm::voice", error = %e, "Report lookup failed");
                match e.backend_message().filter(|m| !m.trim().is_empty()) {
                    Some(message) => AiResponse::error(format!("{} {}", messages::REPORT_FAILED, message)),
                    None => AiResponse::error(messages::REPORT_FAILED),
                }
            }
        }
    }

    async fn process_general(&self, text: &str) -> AiResponse {
        match self.backend.ask(text).await {
            Ok(Some(answer)) => AiResponse::success(answer),
            Ok(None) => AiResponse::info(messages::RETRY_QUESTION),
            Err(e) => {
                warn!(target: "crm::voice", error = %e, "General QA failed");
                AiResponse::error(messages::QA_UNREACHABLE)
            }
        }
    }
}
