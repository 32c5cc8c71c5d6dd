//! Caption and OCR text normalization.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::vocabulary::Vocabulary;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Text after normalization plus how many alias rewrites happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub alias_rewrites: usize,
}

/// Collapse runs of whitespace and trim.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Uppercase the first letter of every sentence.
pub fn capitalize_sentences(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut at_start = true;
    for ch in text.chars() {
        if at_start && ch.is_alphabetic() {
            result.extend(ch.to_uppercase());
            at_start = false;
            continue;
        }
        if matches!(ch, '.' | '!' | '?') {
            at_start = true;
        } else if !ch.is_whitespace() && at_start && ch.is_alphanumeric() {
            at_start = false;
        }
        result.push(ch);
    }
    result
}

/// Truncate to at most `max_chars` characters.
///
/// Prefers ending at a sentence terminator in the second half of the
/// allowance; otherwise cuts at a word boundary and appends `...`.
pub fn truncate_at_boundary(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    if max_chars < 4 {
        return chars[..max_chars].iter().collect();
    }

    let head = &chars[..max_chars];
    if let Some(end) = head.iter().rposition(|c| matches!(c, '.' | '!' | '?')) {
        if end > max_chars / 2 {
            return head[..=end].iter().collect();
        }
    }

    let limit = max_chars - 3;
    let window = &chars[..limit];
    let cut = match window.iter().rposition(|c| c.is_whitespace()) {
        Some(space) if space > 0 => space,
        _ => limit,
    };
    let mut truncated: String = window[..cut].iter().collect();
    truncated.truncate(truncated.trim_end().len());
    truncated.push_str("...");
    truncated
}

/// Set-based Jaccard similarity over lowercase words.
pub fn word_jaccard(a: &str, b: &str) -> f64 {
    if a == b {
        return if a.trim().is_empty() { 0.0 } else { 1.0 };
    }
    let lower_a = a.to_lowercase();
    let lower_b = b.to_lowercase();
    let words_a: HashSet<&str> = lower_a.split_whitespace().collect();
    let words_b: HashSet<&str> = lower_b.split_whitespace().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64
}

/// Caption pipeline: strip fillers, apply synonyms, canonicalize
/// indicators, tidy whitespace and casing, then truncate.
pub fn normalize_caption(vocab: &Vocabulary, text: &str, max_chars: usize) -> Normalized {
    let stripped = match &vocab.fillers {
        Some(fillers) => fillers.replace_all(text, "").into_owned(),
        None => text.to_string(),
    };
    let (with_synonyms, _) = vocab.synonyms.replace(&stripped);
    let (with_aliases, alias_rewrites) = vocab.caption_aliases.replace(&with_synonyms);
    let tidy = capitalize_sentences(&collapse_whitespace(&with_aliases));
    Normalized {
        text: truncate_at_boundary(&tidy, max_chars),
        alias_rewrites,
    }
}

/// Digit or symbol misread for a letter, when it sits inside a word.
fn ocr_letter_for(ch: char) -> Option<char> {
    match ch {
        '0' => Some('O'),
        '1' => Some('I'),
        '5' => Some('S'),
        '8' => Some('B'),
        '|' => Some('I'),
        '@' => Some('A'),
        _ => None,
    }
}

fn fix_ocr_characters(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &ch)| {
            let letter_before = i > 0 && chars[i - 1].is_ascii_alphabetic();
            let letter_after = chars.get(i + 1).is_some_and(|c| c.is_ascii_alphabetic());
            match ocr_letter_for(ch) {
                Some(letter) if letter_before && letter_after => letter,
                _ => ch,
            }
        })
        .collect()
}

/// OCR pipeline: repair spaced-out tickers, fix misread characters inside
/// words, canonicalize indicators (single-letter aliases included).
pub fn normalize_ocr(vocab: &Vocabulary, text: &str) -> Normalized {
    let (spaced, _) = vocab.ocr_spacing.replace(text);
    let fixed = fix_ocr_characters(&spaced);
    let (with_aliases, alias_rewrites) = vocab.ocr_aliases.replace(&fixed);
    Normalized {
        text: collapse_whitespace(&with_aliases),
        alias_rewrites,
    }
}
