//! Domain vocabulary tables and their compiled matchers.
//!
//! The processing algorithms are domain-agnostic; everything trading-specific
//! lives in [`DomainTables::trading`]. Tables are plain data and compile into
//! a [`Vocabulary`] of case-insensitive, whole-word regex matchers.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex, RegexBuilder};

/// A canonical indicator name and the spellings that map to it.
#[derive(Debug, Clone)]
pub struct Indicator {
    pub canonical: String,
    pub aliases: Vec<String>,
}

impl Indicator {
    fn new(canonical: &str, aliases: &[&str]) -> Self {
        Self {
            canonical: canonical.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Raw vocabulary data.
#[derive(Debug, Clone, Default)]
pub struct DomainTables {
    /// Indicator alias table, shared by caption and OCR normalization
    pub indicators: Vec<Indicator>,
    /// Boilerplate phrases stripped from captions
    pub filler_phrases: Vec<String>,
    /// Domain synonyms rewritten in captions (from, to)
    pub synonyms: Vec<(String, String)>,
    /// OCR spacing errors (from, to)
    pub ocr_spacing: Vec<(String, String)>,
    /// Terms counted for caption relevance
    pub domain_terms: Vec<String>,
    /// Terms indexed from transcript segments
    pub transcript_keywords: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect()
}

impl DomainTables {
    /// Trading-chart vocabulary.
    pub fn trading() -> Self {
        Self {
            indicators: vec![
                Indicator::new("VWAP", &["VWAP", "WAP", "V-WAP", "Volume Weighted"]),
                Indicator::new("EMA", &["EMA", "Exponential MA", "Exp Moving Avg", "Exponential"]),
                Indicator::new("RSI", &["RSI", "Relative Strength", "R.S.I"]),
                Indicator::new("MACD", &["MACD", "MAC-D", "MAC D", "Moving Average Convergence"]),
                Indicator::new("SMA", &["SMA", "Simple MA", "Moving Avg"]),
                Indicator::new("Bollinger", &["Bollinger", "BB", "B-Bands", "Bollinger Bands"]),
                Indicator::new("Stoch", &["Stoch", "Stochastic", "Stoch RSI"]),
                Indicator::new("Support", &["Support", "Supp", "S/R", "Support Level"]),
                Indicator::new("Resistance", &["Resistance", "Resist", "R", "Resistance Level"]),
                Indicator::new("Volume", &["Volume", "Vol", "V"]),
            ],
            filler_phrases: owned(&[
                "this image shows",
                "the image displays",
                "in this image",
                "we can see",
                "there is",
                "there are",
                "it shows",
                "showing",
                "displays",
            ]),
            synonyms: pairs(&[
                ("bullish", "bull"),
                ("bearish", "bear"),
                ("uptrend", "up trend"),
                ("downtrend", "down trend"),
                ("breakout", "break out"),
                ("breakdown", "break down"),
                ("candlestick", "candle"),
                ("trendline", "trend line"),
            ]),
            ocr_spacing: pairs(&[
                ("S P Y", "SPY"),
                ("Q Q Q", "QQQ"),
                ("V W A P", "VWAP"),
                ("R S I", "RSI"),
                ("M A C D", "MACD"),
            ]),
            domain_terms: owned(&[
                "chart", "candlestick", "candle", "bar", "volume", "price", "trend",
                "support", "resistance", "breakout", "pattern", "indicator", "moving",
                "average", "rsi", "macd", "bollinger", "stochastic", "fibonacci", "trade",
                "buy", "sell", "long", "short", "bull", "bear", "vwap", "ema", "sma",
            ]),
            transcript_keywords: owned(&[
                "entry", "enter", "buy", "sell", "exit", "close", "position",
                "breakout", "breakdown", "bounce", "rejection", "pullback",
                "support", "resistance", "level", "zone", "area",
                "vwap", "ema", "sma", "rsi", "macd", "bollinger", "stochastic",
                "flag", "triangle", "wedge", "channel", "trendline",
                "stop", "target", "risk", "reward", "size",
            ]),
        }
    }
}

/// Whole-word, case-insensitive, longest-first single-pass replacer.
#[derive(Debug)]
pub struct TermMatcher {
    regex: Option<Regex>,
    replacements: HashMap<String, String>,
    /// Case-only matches are left alone unless the replacement is an acronym
    prose: bool,
}

fn is_acronym(term: &str) -> bool {
    term.chars().all(|c| !c.is_alphabetic() || c.is_uppercase())
}

impl TermMatcher {
    /// Build from (spelling, replacement) pairs. Later duplicates of a
    /// spelling (case-insensitively) are ignored.
    pub fn new<I>(entries: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut replacements = HashMap::new();
        let mut spellings = Vec::new();
        for (spelling, replacement) in entries {
            let key = spelling.to_lowercase();
            if spelling.trim().is_empty() || replacements.contains_key(&key) {
                continue;
            }
            replacements.insert(key, replacement);
            spellings.push(spelling);
        }

        // Longest first so multi-word aliases win over their prefixes.
        spellings.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });

        let regex = if spellings.is_empty() {
            None
        } else {
            let alternation = spellings
                .iter()
                .map(|s| regex::escape(s))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                RegexBuilder::new(&format!(r"\b(?:{})\b", alternation))
                    .case_insensitive(true)
                    .build()?,
            )
        };

        Ok(Self {
            regex,
            replacements,
            prose: false,
        })
    }

    /// Treat input as free text: a match differing from its replacement only
    /// in case is not counted, and keeps its own spelling when the
    /// replacement is an ordinary word.
    pub fn in_prose(mut self) -> Self {
        self.prose = true;
        self
    }

    /// Replace every match; returns the text and the number of matches whose
    /// spelling differed from its replacement.
    pub fn replace(&self, text: &str) -> (String, usize) {
        let Some(regex) = &self.regex else {
            return (text.to_string(), 0);
        };
        let mut changed = 0;
        let result = regex.replace_all(text, |caps: &Captures| {
            let matched = &caps[0];
            match self.replacements.get(&matched.to_lowercase()) {
                Some(replacement) if self.prose && matched.eq_ignore_ascii_case(replacement) => {
                    if is_acronym(replacement) {
                        replacement.clone()
                    } else {
                        matched.to_string()
                    }
                }
                Some(replacement) => {
                    if matched != replacement {
                        changed += 1;
                    }
                    replacement.clone()
                }
                None => matched.to_string(),
            }
        });
        (result.into_owned(), changed)
    }

    /// Distinct replacement values found in `text`, in order of first appearance.
    pub fn find_distinct(&self, text: &str) -> Vec<&str> {
        let Some(regex) = &self.regex else {
            return Vec::new();
        };
        let mut found: Vec<&str> = Vec::new();
        for m in regex.find_iter(text) {
            if let Some(replacement) = self.replacements.get(&m.as_str().to_lowercase()) {
                if !found.contains(&replacement.as_str()) {
                    found.push(replacement);
                }
            }
        }
        found
    }
}

/// Compiled vocabulary.
#[derive(Debug)]
pub struct Vocabulary {
    tables: DomainTables,
    /// Multi-character indicator aliases, for free-text captions
    pub(crate) caption_aliases: TermMatcher,
    /// All indicator aliases including single letters, for OCR text
    pub(crate) ocr_aliases: TermMatcher,
    pub(crate) fillers: Option<Regex>,
    pub(crate) synonyms: TermMatcher,
    pub(crate) ocr_spacing: TermMatcher,
    pub(crate) domain_terms: TermMatcher,
    pub(crate) transcript_keywords: TermMatcher,
}

/// Single-letter aliases are too ambiguous in prose.
const MIN_CAPTION_ALIAS_CHARS: usize = 2;

static TRADING: LazyLock<Arc<Vocabulary>> = LazyLock::new(|| {
    Arc::new(Vocabulary::new(DomainTables::trading()).expect("trading vocabulary compiles"))
});

fn identity(terms: &[String]) -> impl Iterator<Item = (String, String)> + '_ {
    terms.iter().map(|t| (t.clone(), t.to_lowercase()))
}

impl Vocabulary {
    pub fn new(tables: DomainTables) -> Result<Self, regex::Error> {
        let alias_entries = |min_chars: usize| {
            tables
                .indicators
                .iter()
                .flat_map(|ind| {
                    std::iter::once(ind.canonical.clone())
                        .chain(ind.aliases.iter().cloned())
                        .map(move |alias| (alias, ind.canonical.clone()))
                })
                .filter(move |(alias, _)| alias.chars().count() >= min_chars)
                .collect::<Vec<_>>()
        };

        let fillers = if tables.filler_phrases.is_empty() {
            None
        } else {
            let mut phrases = tables.filler_phrases.clone();
            phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
            let alternation = phrases
                .iter()
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                RegexBuilder::new(&format!(r"\b(?:{})\b,?\s*", alternation))
                    .case_insensitive(true)
                    .build()?,
            )
        };

        Ok(Self {
            caption_aliases: TermMatcher::new(alias_entries(MIN_CAPTION_ALIAS_CHARS))?.in_prose(),
            ocr_aliases: TermMatcher::new(alias_entries(1))?,
            fillers,
            synonyms: TermMatcher::new(tables.synonyms.iter().cloned())?,
            ocr_spacing: TermMatcher::new(tables.ocr_spacing.iter().cloned())?,
            domain_terms: TermMatcher::new(identity(&tables.domain_terms))?,
            transcript_keywords: TermMatcher::new(identity(&tables.transcript_keywords))?,
            tables,
        })
    }

    /// Shared trading-chart vocabulary.
    pub fn trading() -> Arc<Vocabulary> {
        Arc::clone(&TRADING)
    }

    pub fn tables(&self) -> &DomainTables {
        &self.tables
    }

    /// Canonical indicator for a spelling, if it is a known alias.
    pub fn canonical_indicator(&self, spelling: &str) -> Option<&str> {
        self.ocr_aliases
            .replacements
            .get(&spelling.to_lowercase())
            .map(String::as_str)
    }

    /// Distinct canonical indicators in OCR text (single-letter aliases count).
    pub fn indicators_in_ocr(&self, text: &str) -> Vec<&str> {
        self.ocr_aliases.find_distinct(text)
    }

    /// Distinct canonical indicators in caption prose.
    pub fn indicators_in_caption(&self, text: &str) -> Vec<&str> {
        self.caption_aliases.find_distinct(text)
    }

    /// Distinct domain terms in `text`.
    pub fn domain_terms_in(&self, text: &str) -> Vec<&str> {
        self.domain_terms.find_distinct(text)
    }

    /// Distinct transcript keywords in `text`.
    pub fn transcript_keywords_in(&self, text: &str) -> Vec<&str> {
        self.transcript_keywords.find_distinct(text)
    }
}
