//! CommandClassifier - transcript → routed command.
//!
//! Stateless keyword matching. Report intent wins over question intent; anything
//! else is `Unknown` with low confidence rather than an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const REPORT_CONFIDENCE: f32 = 0.9;
pub const REPORT_WITHOUT_NAME_CONFIDENCE: f32 = 0.6;
pub const GENERAL_CONFIDENCE: f32 = 0.8;
pub const UNKNOWN_CONFIDENCE: f32 = 0.3;

const REPORT_KEYWORDS: &[&str] = &["گزارش", "عملکرد", "report", "performance"];

const QUESTION_KEYWORDS: &[&str] = &[
    "چیست", "چیه", "چطور", "چگونه", "چرا", "چه", "کجا", "چند", "آیا", "کدام", "توضیح", "بگو",
    "what", "how", "why", "when", "where", "who", "which", "explain",
];

const QUESTION_MARKS: &[char] = &['?', '؟'];

/// Name templates, most specific first. Capture group 1 is the subject.
static NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"گزارش\s+(?:کار|عملکرد|فعالیت|فروش)\s+(?:آقای\s+|خانم\s+|مهندس\s+|دکتر\s+)?(.+)",
        r"گزارش\s+(?:آقای|خانم|مهندس|دکتر)\s+(.+)",
        r"عملکرد\s+(?:آقای\s+|خانم\s+)?(.+?)\s+(?:را|چطور|چگونه|چیست)",
        r"(?i)(?:performance\s+)?report\s+(?:of|for|on|about)\s+(.+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// Trailing words that belong to the request, not the name.
const NAME_SUFFIXES: &[&str] = &["را", "رو", "بده", "بگو", "نشان بده", "چیست", "چیه", "please"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Report,
    General,
    Unknown,
}

/// Classified transcript. `employee_name` is only set for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceCommand {
    pub text: String,
    #[serde(rename = "type")]
    pub command_type: CommandType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommandClassifier;

impl CommandClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, text: &str) -> VoiceCommand {
        let text = text.trim();
        let lowered = text.to_lowercase();

        if REPORT_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            let employee_name = extract_employee_name(text);
            let confidence = if employee_name.is_some() {
                REPORT_CONFIDENCE
            } else {
                REPORT_WITHOUT_NAME_CONFIDENCE
            };
            return VoiceCommand {
                text: text.to_string(),
                command_type: CommandType::Report,
                employee_name,
                confidence,
            };
        }

        let is_question = QUESTION_KEYWORDS.iter().any(|k| lowered.contains(k))
            || lowered.contains(QUESTION_MARKS);
        let (command_type, confidence) = if is_question {
            (CommandType::General, GENERAL_CONFIDENCE)
        } else {
            (CommandType::Unknown, UNKNOWN_CONFIDENCE)
        };
        VoiceCommand {
            text: text.to_string(),
            command_type,
            employee_name: None,
            confidence,
        }
    }
}

/// First matching template yields the trimmed subject.
pub fn extract_employee_name(text: &str) -> Option<String> {
    NAME_PATTERNS.iter().find_map(|re| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| clean_name(m.as_str()))
            .filter(|name| !name.is_empty())
    })
}

fn clean_name(raw: &str) -> String {
    let mut name = raw
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || "؟،؛.!".contains(c))
        .trim()
        .to_string();
    loop {
        let before = name.len();
        for suffix in NAME_SUFFIXES {
            if let Some(stripped) = name.strip_suffix(suffix) {
                if stripped.ends_with(char::is_whitespace) {
                    name = stripped.trim_end().to_string();
                }
            }
        }
        if name.len() == before {
            break;
        }
    }
    name
}
