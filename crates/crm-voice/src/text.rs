//! Text processing shared by capture and synthesis.
//!
//! - [`normalize_transcript`]: canonical form of a recognised transcript (idempotent).
//! - [`summarize`]: extractive summary for responses too long to speak verbatim.
//! - [`preprocess_for_speech`]: spoken numbers, pause spacing, locale punctuation.
//! - [`chunk_text`]: sentence-aligned chunks bounded in length.
//!
//! All lengths are counted in `char`s, not bytes.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Marker that identifies a response as a performance report.
pub const REPORT_MARKER: &str = "گزارش";

const SENTENCE_END: [char; 5] = ['.', '!', '?', '؟', '…'];
const CLAUSE_END: [char; 3] = ['،', '؛', ':'];

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9۰-۹]+(?:,[0-9۰-۹]{3})*(?:[.٫][0-9۰-۹]+)?").expect("static regex")
});

static DATA_POINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9۰-۹]+(?:[.,٫][0-9۰-۹]+)*").expect("static regex"));

static SUBJECT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"گزارش\s+(?:کار|عملکرد|فعالیت)\s+(?:آقای\s+|خانم\s+)?([^\s،,.:؛!؟?]+)",
        r"(?:نام\s+کارمند|کارمند|همکار)\s*:\s*([^\n،,.:؛!؟?]+)",
        r"گزارش\s+(?:آقای|خانم)\s+([^\s،,.:؛!؟?]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// Map one character onto its canonical Persian form.
fn canonical_char(c: char) -> char {
    match c {
        // Arabic yeh / alef maksura -> Persian yeh
        'ي' | 'ى' => 'ی',
        // Arabic kaf -> Persian keheh
        'ك' => 'ک',
        // Arabic-Indic digits -> extended (Persian) digits
        '٠'..='٩' => char::from_u32(c as u32 - 0x0660 + 0x06F0).unwrap_or(c),
        _ => normalize_punctuation(c),
    }
}

/// Latin punctuation to the Persian marks.
pub fn normalize_punctuation(c: char) -> char {
    match c {
        '?' => '؟',
        ',' => '،',
        ';' => '؛',
        _ => c,
    }
}

/// Collapse every whitespace run into one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical form of a raw transcript.
///
/// Collapses whitespace, trims, folds Arabic letter/digit variants onto their
/// Persian forms and converts Latin punctuation to Persian marks. Applying it
/// twice gives the same result as applying it once.
pub fn normalize_transcript(text: &str) -> String {
    let mapped: String = text.chars().map(canonical_char).collect();
    collapse_whitespace(&mapped)
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn is_sentence_end(c: char) -> bool {
    SENTENCE_END.contains(&c)
}

/// Split into sentences. A terminator only ends a sentence when followed by
/// whitespace or end of text, so decimals like `3.5` stay intact. Newlines
/// always end a sentence. Sentences keep their terminator and are
/// whitespace-collapsed.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            push_sentence(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if is_sentence_end(c) {
            let boundary = match chars.peek() {
                None => true,
                Some(next) => next.is_whitespace(),
            };
            if boundary {
                push_sentence(&mut sentences, &mut current);
            }
        }
    }
    push_sentence(&mut sentences, &mut current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let sentence = collapse_whitespace(current);
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
    current.clear();
}

/// Whether a response looks like a performance report.
pub fn is_report(text: &str) -> bool {
    text.contains(REPORT_MARKER)
}

/// Extractive summary of a long response.
///
/// Reports favour the subject name, the number of numeric data points and the
/// first short sentence. Anything else keeps the first 2–3 sentences, bounded
/// by `max_len` characters (ellipsis appended when truncated).
pub fn summarize(text: &str, max_len: usize) -> String {
    if is_report(text) {
        summarize_report(text)
    } else {
        summarize_generic(text, max_len)
    }
}

/// Subject of a report, when one can be spotted.
pub fn extract_subject(text: &str) -> Option<String> {
    SUBJECT_RES.iter().find_map(|re| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

pub fn count_data_points(text: &str) -> usize {
    DATA_POINT_RE.find_iter(text).count()
}

fn summarize_report(text: &str) -> String {
    const SHORT_SENTENCE: usize = 120;

    let mut parts = Vec::new();
    match extract_subject(text) {
        Some(name) => parts.push(format!("گزارش {} آماده است.", name)),
        None => parts.push("گزارش آماده است.".to_string()),
    }

    let points = count_data_points(text);
    if points > 0 {
        parts.push(format!("این گزارش شامل {} داده عددی است.", points));
    }

    if let Some(sentence) = split_sentences(text)
        .into_iter()
        .find(|s| char_len(s) <= SHORT_SENTENCE && !s.ends_with(':'))
    {
        parts.push(sentence);
    }

    parts.push("برای جزئیات کامل، متن گزارش را مشاهده کنید.".to_string());
    parts.join(" ")
}

fn summarize_generic(text: &str, max_len: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return truncate_with_ellipsis(&collapse_whitespace(text), max_len);
    }

    for take in [3usize, 2] {
        let candidate = sentences.iter().take(take).cloned().collect::<Vec<_>>().join(" ");
        if char_len(&candidate) <= max_len {
            return candidate;
        }
    }

    let two = sentences.iter().take(2).cloned().collect::<Vec<_>>().join(" ");
    truncate_with_ellipsis(&two, max_len)
}

/// Cut to at most `max_len` chars including a trailing `...`, preferring a word boundary.
pub fn truncate_with_ellipsis(text: &str, max_len: usize) -> String {
    if char_len(text) <= max_len {
        return text.to_string();
    }
    let budget = max_len.saturating_sub(3);
    let head: String = text.chars().take(budget).collect();
    let cut = match head.rfind(' ') {
        Some(idx) if char_len(&head[..idx]) > budget / 2 => head[..idx].trim_end().to_string(),
        _ => head,
    };
    format!("{}...", cut)
}

const ONES: [&str; 10] = ["صفر", "یک", "دو", "سه", "چهار", "پنج", "شش", "هفت", "هشت", "نه"];
const TEENS: [&str; 10] = [
    "ده", "یازده", "دوازده", "سیزده", "چهارده", "پانزده", "شانزده", "هفده", "هجده", "نوزده",
];
const TENS: [&str; 10] = ["", "", "بیست", "سی", "چهل", "پنجاه", "شصت", "هفتاد", "هشتاد", "نود"];
const HUNDREDS: [&str; 10] = [
    "", "صد", "دویست", "سیصد", "چهارصد", "پانصد", "ششصد", "هفتصد", "هشتصد", "نهصد",
];
const SCALES: [&str; 4] = ["", "هزار", "میلیون", "میلیارد"];

/// Largest value [`number_to_words`] spells out.
pub const MAX_SPOKEN_NUMBER: u64 = 999_999_999_999;

fn below_thousand(n: u64) -> String {
    let mut parts = Vec::new();
    let h = (n / 100) as usize;
    let rest = n % 100;
    if h > 0 {
        parts.push(HUNDREDS[h].to_string());
    }
    if rest >= 20 {
        parts.push(TENS[(rest / 10) as usize].to_string());
        if rest % 10 > 0 {
            parts.push(ONES[(rest % 10) as usize].to_string());
        }
    } else if rest >= 10 {
        parts.push(TEENS[(rest - 10) as usize].to_string());
    } else if rest > 0 {
        parts.push(ONES[rest as usize].to_string());
    }
    parts.join(" و ")
}

/// Persian words for `n`. `None` above [`MAX_SPOKEN_NUMBER`].
pub fn number_to_words(n: u64) -> Option<String> {
    if n > MAX_SPOKEN_NUMBER {
        return None;
    }
    if n == 0 {
        return Some(ONES[0].to_string());
    }

    let mut groups = Vec::new();
    let mut rest = n;
    while rest > 0 {
        groups.push(rest % 1000);
        rest /= 1000;
    }

    let mut parts = Vec::new();
    for (scale, &group) in groups.iter().enumerate().rev() {
        if group == 0 {
            continue;
        }
        let words = if scale == 1 && group == 1 {
            SCALES[1].to_string()
        } else if scale == 0 {
            below_thousand(group)
        } else {
            format!("{} {}", below_thousand(group), SCALES[scale])
        };
        parts.push(words);
    }
    Some(parts.join(" و "))
}

fn ascii_digits(s: &str) -> String {
    s.chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            '۰'..='۹' => char::from_u32(c as u32 - 0x06F0 + '0' as u32),
            _ => None,
        })
        .collect()
}

fn spoken_digits(raw: &str) -> Option<String> {
    let digits = ascii_digits(raw);
    if digits.len() > 12 {
        return None;
    }
    number_to_words(digits.parse::<u64>().ok()?)
}

fn speak_number(caps: &Captures<'_>) -> String {
    let raw = &caps[0];
    let (int_part, frac_part) = match raw.find(|c: char| c == '.' || c == '٫') {
        Some(idx) => {
            let sep_len = raw[idx..].chars().next().map(char::len_utf8).unwrap_or(1);
            (&raw[..idx], Some(&raw[idx + sep_len..]))
        }
        None => (raw, None),
    };

    let Some(int_words) = spoken_digits(int_part) else {
        return raw.to_string();
    };
    match frac_part {
        None => int_words,
        Some(frac) => match spoken_digits(frac) {
            Some(frac_words) => format!("{} ممیز {}", int_words, frac_words),
            None => raw.to_string(),
        },
    }
}

/// Prepare text for the synthesis engine.
///
/// Digits become Persian words, percent signs are spoken, Latin punctuation is
/// converted, and every sentence/clause mark is followed by a space so the
/// engine pauses there.
pub fn preprocess_for_speech(text: &str) -> String {
    let spoken = NUMBER_RE.replace_all(text, |caps: &Captures<'_>| speak_number(caps));

    let mut out = String::with_capacity(spoken.len() + 16);
    let mut chars = spoken.chars().map(normalize_punctuation).peekable();
    while let Some(c) = chars.next() {
        if c == '%' || c == '٪' {
            out.push_str(" درصد");
            continue;
        }
        out.push(c);
        if is_sentence_end(c) || CLAUSE_END.contains(&c) {
            if let Some(&next) = chars.peek() {
                if !next.is_whitespace() && !is_sentence_end(next) && !CLAUSE_END.contains(&next) {
                    out.push(' ');
                }
            }
        }
    }
    collapse_whitespace(&out)
}

/// Split into chunks of at most `max_len` chars on sentence boundaries.
///
/// Whole sentences are packed into a chunk until the next one would overflow.
/// A sentence longer than `max_len` is broken between words; only a single
/// word longer than `max_len` can yield an oversized chunk. Joining the chunks
/// with a space gives back the whitespace-collapsed input.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if char_len(&sentence) > max_len {
            flush(&mut chunks, &mut current);
            chunks.extend(split_on_words(&sentence, max_len));
            continue;
        }
        if current.is_empty() {
            current = sentence;
        } else if char_len(&current) + 1 + char_len(&sentence) <= max_len {
            current.push(' ');
            current.push_str(&sentence);
        } else {
            flush(&mut chunks, &mut current);
            current = sentence;
        }
    }
    flush(&mut chunks, &mut current);
    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
}

fn split_on_words(sentence: &str, max_len: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if char_len(&current) + 1 + char_len(word) <= max_len {
            current.push(' ');
            current.push_str(word);
        } else {
            pieces.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
