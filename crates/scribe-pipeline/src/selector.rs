//! Key-frame scoring and selection.
//!
//! Every caption gets a composite score from transcript proximity, on-screen
//! indicators, apparent scene change, lexical relevance and position in the
//! video. Selection walks the ranked candidates greedily while keeping a
//! minimum separation, then backfills empty stretches of the timeline.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use scribe_models::{clamp_to_duration, FrameCaption, Transcript};

use crate::transcript::TranscriptKeywordIndex;
use crate::vocabulary::Vocabulary;

// ============================================================================
// Configuration
// ============================================================================

/// Weight of each scoring signal in the composite score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub transcript: f64,
    pub indicator: f64,
    pub scene_change: f64,
    pub relevance: f64,
    pub temporal: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            transcript: 100.0,
            indicator: 50.0,
            scene_change: 30.0,
            relevance: 20.0,
            temporal: 10.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Seconds either side of a keyword-bearing segment start
    pub transcript_window: f64,
    /// Minimum seconds between two selected frames
    pub min_separation: f64,
    /// Indicator score above which a frame is promoted to tier 2
    pub indicator_threshold: f64,
    /// Scene-change score above which a frame is promoted to tier 2
    pub scene_change_threshold: f64,
    pub weights: ScoreWeights,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            transcript_window: 3.0,
            min_separation: 2.0,
            indicator_threshold: 0.8,
            scene_change_threshold: 0.7,
            weights: ScoreWeights::default(),
        }
    }
}

// ============================================================================
// Scored frames
// ============================================================================

/// Priority tier; lower is more important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PriorityTier {
    /// Near a transcript keyword
    Transcript = 1,
    /// Strong on-screen indicators or scene change
    Visual = 2,
    Baseline = 3,
}

impl PriorityTier {
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredFrame {
    pub caption: FrameCaption,
    pub score: f64,
    pub tier: PriorityTier,
    pub reasons: Vec<&'static str>,
}

impl ScoredFrame {
    fn timestamp(&self) -> f64 {
        self.caption.timestamp
    }
}

/// Ranking order: tier, then score descending, then timestamp and frame id.
fn rank_order(a: &ScoredFrame, b: &ScoredFrame) -> Ordering {
    a.tier
        .cmp(&b.tier)
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| a.timestamp().total_cmp(&b.timestamp()))
        .then_with(|| a.caption.frame.cmp(&b.caption.frame))
}

fn chronological(a: &ScoredFrame, b: &ScoredFrame) -> Ordering {
    a.timestamp()
        .total_cmp(&b.timestamp())
        .then_with(|| a.caption.frame.cmp(&b.caption.frame))
}

/// Position bonus favouring the opening, the middle and the close.
pub fn temporal_bonus(timestamp: f64, duration: f64) -> f64 {
    if duration <= 0.0 {
        return 0.0;
    }
    let position = (timestamp / duration).clamp(0.0, 1.0);
    if position < 0.1 || (0.4..=0.6).contains(&position) || position > 0.9 {
        1.0
    } else if (0.1..0.3).contains(&position) || (0.7..=0.9).contains(&position) {
        0.5
    } else {
        0.2
    }
}

/// Caption length and lexical variety as a stand-in for visual change.
pub fn scene_change_score(caption: &str) -> f64 {
    let length_part = (caption.chars().count() as f64 / 200.0).min(0.5);
    let words: Vec<String> = caption.split_whitespace().map(str::to_lowercase).collect();
    if words.is_empty() {
        return length_part;
    }
    let mut unique = words.clone();
    unique.sort();
    unique.dedup();
    length_part + (unique.len() as f64 / words.len() as f64).min(0.5)
}

// ============================================================================
// Selector
// ============================================================================

#[derive(Debug, Clone)]
pub struct FrameSelector {
    config: SelectorConfig,
    vocab: Arc<Vocabulary>,
}

impl FrameSelector {
    pub fn new(config: SelectorConfig, vocab: Arc<Vocabulary>) -> Self {
        Self { config, vocab }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Indicator evidence from OCR text, or from the caption when no OCR exists.
    pub fn indicator_score(&self, caption: &FrameCaption) -> f64 {
        let (text, found) = if caption.has_ocr() {
            (&caption.ocr, self.vocab.indicators_in_ocr(&caption.ocr))
        } else {
            (&caption.caption, self.vocab.indicators_in_caption(&caption.caption))
        };
        let mut score = 0.3 * found.len() as f64;
        if text.chars().any(|c| c.is_ascii_digit()) {
            score += 0.2;
        }
        if caption.confidence > 0.8 {
            score *= 1.2;
        }
        score.min(1.0)
    }

    fn relevance_score(&self, caption: &FrameCaption) -> f64 {
        let text = format!("{} {}", caption.caption, caption.ocr);
        (self.vocab.domain_terms_in(&text).len() as f64 / 10.0).min(1.0)
    }

    /// Score every caption. Timestamps are clamped into the video duration.
    pub fn score_frames(
        &self,
        captions: &[FrameCaption],
        transcript: Option<&Transcript>,
    ) -> Vec<ScoredFrame> {
        let duration = transcript
            .map(Transcript::effective_duration)
            .filter(|d| *d > 0.0)
            .unwrap_or_else(|| captions.iter().map(|c| c.timestamp).fold(0.0, f64::max));
        let index = transcript
            .map(|t| TranscriptKeywordIndex::build(t, &self.vocab))
            .unwrap_or_default();
        let weights = &self.config.weights;

        captions
            .iter()
            .map(|caption| {
                let mut caption = caption.clone();
                caption.timestamp = clamp_to_duration(caption.timestamp, duration);

                let mut tier = PriorityTier::Baseline;
                let mut score = 0.0;
                let mut reasons = Vec::new();

                let transcript_score =
                    index.relevance(caption.timestamp, self.config.transcript_window);
                if transcript_score > 0.0 {
                    tier = PriorityTier::Transcript;
                    score += transcript_score * weights.transcript;
                    reasons.push("transcript_keywords");
                }

                let indicator = self.indicator_score(&caption);
                if indicator > self.config.indicator_threshold {
                    tier = tier.min(PriorityTier::Visual);
                    score += indicator * weights.indicator;
                    reasons.push("indicators");
                }

                let scene = scene_change_score(&caption.caption);
                if scene > self.config.scene_change_threshold {
                    tier = tier.min(PriorityTier::Visual);
                    score += scene * weights.scene_change;
                    reasons.push("scene_change");
                }

                let relevance = self.relevance_score(&caption);
                if relevance > 0.0 {
                    score += relevance * weights.relevance;
                    reasons.push("domain_terms");
                }

                score += temporal_bonus(caption.timestamp, duration) * weights.temporal;

                ScoredFrame {
                    caption,
                    score,
                    tier,
                    reasons,
                }
            })
            .collect()
    }

    fn is_separated(&self, candidate: &ScoredFrame, chosen: &[ScoredFrame]) -> bool {
        chosen.iter().all(|c| {
            (c.timestamp() - candidate.timestamp()).abs() >= self.config.min_separation
        })
    }

    /// Select at most `max_frames` from a scored pool, chronologically sorted.
    pub fn select_scored(&self, mut pool: Vec<ScoredFrame>, max_frames: usize) -> Vec<ScoredFrame> {
        if max_frames == 0 || pool.is_empty() {
            return Vec::new();
        }
        if pool.len() <= max_frames {
            pool.sort_by(chronological);
            return pool;
        }

        pool.sort_by(rank_order);
        let mut chosen: Vec<ScoredFrame> = Vec::with_capacity(max_frames);
        let mut taken = vec![false; pool.len()];

        for (i, candidate) in pool.iter().enumerate() {
            if chosen.len() == max_frames {
                break;
            }
            if candidate.score > 0.0 && self.is_separated(candidate, &chosen) {
                chosen.push(candidate.clone());
                taken[i] = true;
            }
        }

        if chosen.len() < max_frames {
            self.backfill(&pool, &mut taken, &mut chosen, max_frames);
        }

        chosen.sort_by(chronological);
        chosen
    }

    /// Fill timeline segments that have no chosen frame with the best
    /// remaining frame of that segment.
    fn backfill(
        &self,
        ranked: &[ScoredFrame],
        taken: &mut [bool],
        chosen: &mut Vec<ScoredFrame>,
        max_frames: usize,
    ) {
        let span = ranked.iter().map(ScoredFrame::timestamp).fold(0.0, f64::max);
        // A zero-length timeline is a single segment
        let segments = if span > 0.0 { max_frames } else { 1 };
        let width = span / segments as f64;
        let segment_of = |ts: f64| {
            if span > 0.0 {
                ((ts / width) as usize).min(segments - 1)
            } else {
                0
            }
        };

        for segment in 0..segments {
            if chosen.len() == max_frames {
                break;
            }
            if chosen.iter().any(|c| segment_of(c.timestamp()) == segment) {
                continue;
            }
            // `ranked` is already in rank order, so the first fit is the best
            let pick = ranked.iter().enumerate().find(|(i, frame)| {
                !taken[*i]
                    && segment_of(frame.timestamp()) == segment
                    && self.is_separated(frame, chosen)
            });
            if let Some((i, frame)) = pick {
                taken[i] = true;
                chosen.push(frame.clone());
            }
        }
    }

    /// Score and select key frames.
    pub fn select_key_frames(
        &self,
        captions: &[FrameCaption],
        transcript: Option<&Transcript>,
        max_frames: usize,
    ) -> Vec<FrameCaption> {
        let scored = self.score_frames(captions, transcript);
        self.select_scored(scored, max_frames)
            .into_iter()
            .map(|s| s.caption)
            .collect()
    }
}
