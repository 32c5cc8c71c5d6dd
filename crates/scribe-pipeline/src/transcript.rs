//! Transcript keyword index.

use std::sync::LazyLock;

use regex::Regex;

use scribe_models::Transcript;

use crate::vocabulary::Vocabulary;

static PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\$\d+(?:\.\d+)?|\b\d+(?:\.\d+)?\s*(?:dollars?|cents?|k|thousand|mil|million)\b",
    )
    .unwrap()
});

/// Keywords found in one transcript segment.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordEntry {
    pub start: f64,
    pub keywords: Vec<String>,
}

/// Segment start time to the keywords spoken in that segment.
///
/// Only keyword-bearing segments are indexed; entries are sorted by start.
#[derive(Debug, Clone, Default)]
pub struct TranscriptKeywordIndex {
    entries: Vec<KeywordEntry>,
}

impl TranscriptKeywordIndex {
    pub fn build(transcript: &Transcript, vocab: &Vocabulary) -> Self {
        let mut entries: Vec<KeywordEntry> = transcript
            .segments
            .iter()
            .filter_map(|segment| {
                let mut keywords: Vec<String> = vocab
                    .transcript_keywords_in(&segment.text)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                for price in PRICE.find_iter(&segment.text) {
                    let tag = format!("price:{}", price.as_str().to_lowercase());
                    if !keywords.contains(&tag) {
                        keywords.push(tag);
                    }
                }
                (!keywords.is_empty()).then(|| KeywordEntry {
                    start: segment.start.max(0.0),
                    keywords,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.start.total_cmp(&b.start));
        Self { entries }
    }

    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose start lies within `window` seconds of `timestamp`.
    pub fn near(&self, timestamp: f64, window: f64) -> impl Iterator<Item = &KeywordEntry> {
        let first = self
            .entries
            .partition_point(|e| e.start < timestamp - window);
        self.entries[first..]
            .iter()
            .take_while(move |e| e.start <= timestamp + window)
    }

    /// Keyword density near `timestamp`: `min(max keywords / 10, 1)`.
    pub fn relevance(&self, timestamp: f64, window: f64) -> f64 {
        self.near(timestamp, window)
            .map(|e| (e.keywords.len() as f64 / 10.0).min(1.0))
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_models::TranscriptSegment;

    fn transcript() -> Transcript {
        Transcript::from_segments(vec![
            TranscriptSegment::new(0, 0.0, 5.0, "Welcome back everyone"),
            TranscriptSegment::new(1, 30.0, 35.0, "Price is bouncing off VWAP support"),
            TranscriptSegment::new(2, 10.0, 15.0, "Target is $452.50 with a stop at 448 dollars"),
        ])
    }

    #[test]
    fn test_only_keyword_segments_indexed() {
        let index = TranscriptKeywordIndex::build(&transcript(), &Vocabulary::trading());
        let starts: Vec<f64> = index.entries().iter().map(|e| e.start).collect();
        assert_eq!(starts, vec![10.0, 30.0]);
    }

    #[test]
    fn test_price_mentions_tagged() {
        let index = TranscriptKeywordIndex::build(&transcript(), &Vocabulary::trading());
        let keywords = &index.entries()[0].keywords;
        assert!(keywords.contains(&"target".to_string()));
        assert!(keywords.contains(&"stop".to_string()));
        assert!(keywords.contains(&"price:$452.50".to_string()));
        assert!(keywords.contains(&"price:448 dollars".to_string()));
    }

    #[test]
    fn test_relevance_window() {
        let index = TranscriptKeywordIndex::build(&transcript(), &Vocabulary::trading());
        // "bounce" is not "bouncing"; vwap + support
        assert!((index.relevance(31.0, 3.0) - 0.2).abs() < 1e-9);
        assert!((index.relevance(27.0, 3.0) - 0.2).abs() < 1e-9);
        assert_eq!(index.relevance(26.9, 3.0), 0.0);
        assert_eq!(index.relevance(100.0, 3.0), 0.0);
    }

    #[test]
    fn test_empty_transcript() {
        let index = TranscriptKeywordIndex::build(&Transcript::default(), &Vocabulary::trading());
        assert!(index.is_empty());
        assert_eq!(index.relevance(0.0, 3.0), 0.0);
    }
}
