//! Voice selection against the live platform voice list.

use crate::platform::PlatformVoice;
use serde::Serialize;

/// Name fragments of voices known to be female.
const FEMALE_MARKERS: &[&str] = &[
    "female", "woman", "zira", "samantha", "victoria", "karen", "moira", "tessa", "susan",
    "hazel", "dilara", "maryam", "zahra", "sara", "laila", "hoda", "salma", "zeina", "mariam",
];

/// Vendors whose voices are usually of good quality.
const QUALITY_PROVIDERS: &[&str] = &["google", "microsoft", "apple", "amazon"];

/// Which rung of the preference ladder produced the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    PrimaryFemale,
    Primary,
    SecondaryFemale,
    Secondary,
    AnyFemale,
    QualityProvider,
    FirstAvailable,
}

pub fn is_female(voice: &PlatformVoice) -> bool {
    let name = voice.name.to_lowercase();
    FEMALE_MARKERS.iter().any(|m| name.contains(m))
}

/// True when `lang` belongs to the family (`fa` matches `fa`, `fa-IR`, `fa_IR`).
pub fn in_family(lang: &str, family: &str) -> bool {
    let lang = lang.to_lowercase();
    let family = family.to_lowercase();
    lang == family || lang.starts_with(&format!("{}-", family)) || lang.starts_with(&format!("{}_", family))
}

fn is_quality_provider(voice: &PlatformVoice) -> bool {
    let name = voice.name.to_lowercase();
    QUALITY_PROVIDERS.iter().any(|p| name.contains(p))
}

const LADDER: [SelectionReason; 6] = [
    SelectionReason::PrimaryFemale,
    SelectionReason::Primary,
    SelectionReason::SecondaryFemale,
    SelectionReason::Secondary,
    SelectionReason::AnyFemale,
    SelectionReason::QualityProvider,
];

fn matches_rung(reason: SelectionReason, voice: &PlatformVoice, primary: &str, secondary: &str) -> bool {
    match reason {
        SelectionReason::PrimaryFemale => in_family(&voice.lang, primary) && is_female(voice),
        SelectionReason::Primary => in_family(&voice.lang, primary),
        SelectionReason::SecondaryFemale => in_family(&voice.lang, secondary) && is_female(voice),
        SelectionReason::Secondary => in_family(&voice.lang, secondary),
        SelectionReason::AnyFemale => is_female(voice),
        SelectionReason::QualityProvider => is_quality_provider(voice),
        SelectionReason::FirstAvailable => true,
    }
}

/// Pick the best voice. First match wins:
/// primary female, primary, secondary female, secondary, any female,
/// known quality provider, first listed. `None` leaves the platform default.
pub fn select_voice(
    voices: &[PlatformVoice],
    primary_family: &str,
    secondary_family: &str,
) -> Option<(PlatformVoice, SelectionReason)> {
    LADDER
        .iter()
        .find_map(|&reason| {
            voices
                .iter()
                .find(|v| matches_rung(reason, v, primary_family, secondary_family))
                .map(|v| (v.clone(), reason))
        })
        .or_else(|| {
            voices
                .first()
                .map(|v| (v.clone(), SelectionReason::FirstAvailable))
        })
}

/// Language tag for utterances spoken with `voice`.
///
/// A voice from either family keeps its own tag; any other voice gets the
/// neutral tag so the engine is not asked to force an unsupported language.
pub fn utterance_language(
    voice: Option<&PlatformVoice>,
    primary_family: &str,
    secondary_family: &str,
    neutral: &str,
    default: &str,
) -> String {
    match voice {
        Some(v) if in_family(&v.lang, primary_family) || in_family(&v.lang, secondary_family) => {
            v.lang.clone()
        }
        Some(_) => neutral.to_string(),
        None => default.to_string(),
    }
}
