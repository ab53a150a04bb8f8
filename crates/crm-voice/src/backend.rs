//! CRM backend collaborators: session check, report lookup, general QA.
//!
//! `HttpCrmBackend` talks JSON over HTTP with `reqwest`. The command processor
//! only sees the [`CrmBackend`] trait so tests can script outcomes.

use crate::config::BackendConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Answer fields tried in order on a general-QA response; first populated wins.
pub const ANSWER_FIELDS: &[&str] = &["answer", "response", "result", "text", "message"];

/// Outcome of a successful report lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportLookup {
    Found { employee_name: String, analysis: String },
    NotFound { employee_name: Option<String> },
}

#[async_trait]
pub trait CrmBackend: Send + Sync {
    /// `Ok(true)` only for a confirmed, valid session.
    async fn check_auth(&self) -> Result<bool, BackendError>;

    async fn lookup_report(&self, text: &str, employee_name: &str) -> Result<ReportLookup, BackendError>;

    /// Free-text question. `Ok(None)` when the backend answered without a usable answer.
    async fn ask(&self, text: &str) -> Result<Option<String>, BackendError>;
}

#[derive(Debug, Deserialize)]
struct AuthBody {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Serialize)]
struct ReportRequest<'a> {
    text: &'a str,
    #[serde(rename = "employeeName")]
    employee_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReportBody {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<ReportData>,
}

#[derive(Debug, Deserialize)]
struct ReportData {
    #[serde(default)]
    employee_found: bool,
    #[serde(default)]
    employee_name: Option<String>,
    #[serde(default)]
    analysis: Option<String>,
}

/// Pull the answer out of a general-QA body. Also looks one level into `data`.
pub fn extract_answer(body: &Value) -> Option<String> {
    let pick = |obj: &Value| {
        ANSWER_FIELDS.iter().find_map(|field| {
            obj.get(*field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    };
    pick(body).or_else(|| body.get("data").and_then(pick))
}

#[derive(Debug, Clone)]
pub struct HttpCrmBackend {
    config: BackendConfig,
    client: reqwest::Client,
}

impl HttpCrmBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

#[async_trait]
impl CrmBackend for HttpCrmBackend {
    async fn check_auth(&self) -> Result<bool, BackendError> {
        let url = self.config.url(&self.config.auth_check_path);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            debug!(target: "crm::voice", status = res.status().as_u16(), "Auth check rejected");
            return Ok(false);
        }
        let body: AuthBody = match res.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!(target: "crm::voice", error = %e, "Auth check body unreadable");
                return Ok(false);
            }
        };
        Ok(body.success)
    }

    async fn lookup_report(&self, text: &str, employee_name: &str) -> Result<ReportLookup, BackendError> {
        let url = self.config.url(&self.config.report_path);
        let res = self
            .client
            .post(&url)
            .json(&ReportRequest { text, employee_name })
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let message = res
                .json::<Value>()
                .await
                .ok()
                .and_then(|b| b.get("message").and_then(Value::as_str).map(str::to_string))
                .filter(|m| !m.trim().is_empty());
            return Err(BackendError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body: ReportBody = res.json().await?;
        if !body.success {
            return Err(BackendError::Rejected(body.message.unwrap_or_default()));
        }
        let data = body
            .data
            .ok_or_else(|| BackendError::Malformed("missing data".to_string()))?;
        if data.employee_found {
            Ok(ReportLookup::Found {
                employee_name: data.employee_name.unwrap_or_else(|| employee_name.to_string()),
                analysis: data.analysis.unwrap_or_default(),
            })
        } else {
            Ok(ReportLookup::NotFound {
                employee_name: data.employee_name,
            })
        }
    }

    async fn ask(&self, text: &str) -> Result<Option<String>, BackendError> {
        let url = format!(
            "{}?q={}",
            self.config.url(&self.config.ask_path),
            urlencoding::encode(text)
        );
        let res = self.client.get(&url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(BackendError::Http {
                status: status.as_u16(),
                message: None,
            });
        }
        match res.json::<Value>().await {
            Ok(body) => Ok(extract_answer(&body)),
            Err(e) => {
                warn!(target: "crm::voice", error = %e, "General answer body is not JSON");
                Ok(None)
            }
        }
    }
}
