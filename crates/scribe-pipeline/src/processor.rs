//! Caption processing: normalization, duplicate merging, key-frame selection
//! and token budgeting.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use scribe_models::{
    estimate_tokens, CaptionPass, CaptionsOutput, FrameCaption, ProcessedCaptionSet,
    ProcessingStats, Transcript,
};

use crate::normalize::{normalize_caption, normalize_ocr, truncate_at_boundary, word_jaccard};
use crate::selector::{FrameSelector, SelectorConfig};
use crate::vocabulary::Vocabulary;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Caption length cap in characters
    pub max_caption_length: usize,
    /// Captions closer than this (seconds) may be merged
    pub merge_window_secs: f64,
    /// OCR word-set similarity above which two frames are duplicates
    pub ocr_similarity: f64,
    /// Caption word-set similarity used when either frame lacks OCR
    pub caption_similarity: f64,
    pub max_key_frames: usize,
    /// Token budget for the key-frame set
    pub token_budget: usize,
    /// Floor for the per-caption cap while fitting the budget
    pub min_caption_length: usize,
    /// Multiplier on the frame-count target when reducing frames
    pub frame_reduction_safety: f64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_caption_length: 120,
            merge_window_secs: 2.0,
            ocr_similarity: 0.8,
            caption_similarity: 0.7,
            max_key_frames: 12,
            token_budget: 4000,
            min_caption_length: 16,
            frame_reduction_safety: 0.8,
        }
    }
}

/// Outcome of fitting key frames into the token budget.
#[derive(Debug, Clone)]
pub struct BudgetFit {
    pub frames: Vec<FrameCaption>,
    pub optimized: bool,
    pub met: bool,
    pub tokens: usize,
}

fn chronological(a: &FrameCaption, b: &FrameCaption) -> std::cmp::Ordering {
    a.timestamp
        .total_cmp(&b.timestamp)
        .then_with(|| a.frame.cmp(&b.frame))
}

pub struct CaptionProcessor {
    config: ProcessorConfig,
    vocab: Arc<Vocabulary>,
    selector: FrameSelector,
}

impl CaptionProcessor {
    /// Processor with the trading vocabulary.
    pub fn new(config: ProcessorConfig, selector_config: SelectorConfig) -> Self {
        Self::with_vocabulary(config, selector_config, Vocabulary::trading())
    }

    pub fn with_vocabulary(
        config: ProcessorConfig,
        selector_config: SelectorConfig,
        vocab: Arc<Vocabulary>,
    ) -> Self {
        Self {
            selector: FrameSelector::new(selector_config, Arc::clone(&vocab)),
            config,
            vocab,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn selector(&self) -> &FrameSelector {
        &self.selector
    }

    /// Normalize caption and OCR text. Returns the captions and the number
    /// of indicator aliases rewritten.
    pub fn normalize(&self, captions: &[FrameCaption]) -> (Vec<FrameCaption>, usize) {
        let mut rewrites = 0;
        let normalized = captions
            .iter()
            .map(|caption| {
                let text = normalize_caption(&self.vocab, &caption.caption, self.config.max_caption_length);
                let ocr = normalize_ocr(&self.vocab, &caption.ocr);
                rewrites += text.alias_rewrites + ocr.alias_rewrites;
                FrameCaption {
                    caption: text.text,
                    ocr: ocr.text,
                    ..caption.clone()
                }
            })
            .collect();
        (normalized, rewrites)
    }

    fn is_duplicate(&self, a: &FrameCaption, b: &FrameCaption) -> bool {
        if (a.timestamp - b.timestamp).abs() > self.config.merge_window_secs {
            return false;
        }
        if a.has_ocr() && b.has_ocr() {
            word_jaccard(&a.ocr, &b.ocr) > self.config.ocr_similarity
        } else if a.caption.trim().is_empty() && b.caption.trim().is_empty() {
            true
        } else {
            word_jaccard(&a.caption, &b.caption) > self.config.caption_similarity
        }
    }

    /// Remove captions left with neither caption nor OCR text.
    fn drop_blank(captions: Vec<FrameCaption>) -> Vec<FrameCaption> {
        let before = captions.len();
        let kept: Vec<FrameCaption> = captions
            .into_iter()
            .filter(|c| !c.caption.is_empty() || c.has_ocr())
            .collect();
        if kept.len() < before {
            debug!(
                dropped = before - kept.len(),
                "Dropped captions with no text after normalization"
            );
        }
        kept
    }

    /// Key frames the full processing chain would select from `captions`,
    /// before budget fitting.
    pub fn select_key_frames(
        &self,
        captions: &[FrameCaption],
        transcript: Option<&Transcript>,
    ) -> Vec<FrameCaption> {
        let (normalized, _) = self.normalize(captions);
        let (merged, _) = self.merge_duplicates(Self::drop_blank(normalized));
        self.selector
            .select_key_frames(&merged, transcript, self.config.max_key_frames)
    }

    /// Merge near-duplicate captions until no duplicates remain.
    ///
    /// The merged entry keeps the higher-confidence text, the longer OCR,
    /// the averaged timestamp and the max confidence. Returns the
    /// chronologically sorted survivors and the number removed.
    pub fn merge_duplicates(&self, captions: Vec<FrameCaption>) -> (Vec<FrameCaption>, usize) {
        let mut current = captions;
        current.sort_by(chronological);
        let mut removed = 0;

        loop {
            let before = current.len();
            let mut kept: Vec<FrameCaption> = Vec::with_capacity(before);
            for caption in current {
                match kept.iter().position(|k| self.is_duplicate(k, &caption)) {
                    Some(i) => kept[i] = merge_pair(&kept[i], caption),
                    None => kept.push(caption),
                }
            }
            kept.sort_by(chronological);
            removed += before - kept.len();
            let settled = kept.len() == before;
            current = kept;
            // Averaged timestamps can bring new pairs into the window
            if settled {
                break;
            }
        }

        (current, removed)
    }

    /// Reduce frame count, then caption length, until the budget is met or
    /// the length floor is reached.
    pub fn fit_to_budget(&self, frames: Vec<FrameCaption>) -> BudgetFit {
        let budget = self.config.token_budget;
        let mut frames = frames;
        let mut tokens = estimate_tokens(&frames);
        if tokens <= budget {
            return BudgetFit {
                frames,
                optimized: false,
                met: true,
                tokens,
            };
        }

        let target = ((frames.len() as f64 * budget as f64 / tokens as f64)
            * self.config.frame_reduction_safety)
            .floor() as usize;
        let target = target.max(1);
        if target < frames.len() {
            frames.sort_by(|a, b| {
                b.confidence
                    .total_cmp(&a.confidence)
                    .then_with(|| chronological(a, b))
            });
            frames.truncate(target);
            frames.sort_by(chronological);
            tokens = estimate_tokens(&frames);
            debug!(kept = frames.len(), tokens, "Reduced key frames for token budget");
        }

        let originals = frames.clone();
        let mut cap = self.config.max_caption_length;
        while tokens > budget && cap > self.config.min_caption_length {
            cap = ((cap as f64 * 0.8) as usize)
                .min(cap - 1)
                .max(self.config.min_caption_length);
            frames = originals
                .iter()
                .map(|c| FrameCaption {
                    caption: truncate_at_boundary(&c.caption, cap),
                    ocr: truncate_at_boundary(&c.ocr, cap),
                    ..c.clone()
                })
                .collect();
            tokens = estimate_tokens(&frames);
        }

        let met = tokens <= budget;
        if !met {
            warn!(tokens, budget, cap, "Token budget not met at minimum caption length");
        }
        BudgetFit {
            frames,
            optimized: true,
            met,
            tokens,
        }
    }

    /// Run the full processing chain over a raw caption batch.
    pub fn process(&self, raw: &CaptionsOutput, transcript: Option<&Transcript>) -> ProcessedCaptionSet {
        let start = Instant::now();
        let original_length: usize = raw.frames.iter().map(FrameCaption::text_len).sum();

        let (normalized, indicators_normalized) = self.normalize(&raw.frames);
        let normalized = Self::drop_blank(normalized);

        let fast: Vec<FrameCaption> = normalized
            .iter()
            .filter(|c| c.pass == CaptionPass::Fast)
            .cloned()
            .collect();
        let rich: Vec<FrameCaption> = normalized
            .iter()
            .filter(|c| c.pass == CaptionPass::Rich)
            .cloned()
            .collect();
        let (fast_pass, rich_pass) = if !fast.is_empty() && !rich.is_empty() {
            (Some(fast), Some(rich))
        } else {
            (None, None)
        };

        let (captions, duplicates_removed) = self.merge_duplicates(normalized);
        let key_frames =
            self.selector
                .select_key_frames(&captions, transcript, self.config.max_key_frames);
        let fit = self.fit_to_budget(key_frames);

        let compressed_length: usize = captions.iter().map(FrameCaption::text_len).sum();
        let compression_ratio = if original_length == 0 {
            1.0
        } else {
            compressed_length as f64 / original_length as f64
        };

        let stats = ProcessingStats {
            original_caption_length: original_length,
            compressed_length,
            compression_ratio,
            indicators_normalized,
            duplicates_removed,
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            captions = captions.len(),
            key_frames = fit.frames.len(),
            duplicates_removed,
            tokens = fit.tokens,
            budget_met = fit.met,
            "Processed captions"
        );

        ProcessedCaptionSet {
            source_file: raw.source_file.clone(),
            total_frames: raw.total_frames.max(raw.frames.len()),
            processed_count: captions.len(),
            captions,
            key_frames: fit.frames,
            fast_pass,
            rich_pass,
            token_optimized: fit.optimized,
            token_budget_met: fit.met,
            estimated_tokens: fit.tokens,
            processing_stats: stats,
        }
    }
}

fn merge_pair(existing: &FrameCaption, incoming: FrameCaption) -> FrameCaption {
    let timestamp = (existing.timestamp + incoming.timestamp) / 2.0;
    let confidence = existing.confidence.max(incoming.confidence);
    let ocr = if incoming.ocr.chars().count() > existing.ocr.chars().count() {
        incoming.ocr.clone()
    } else {
        existing.ocr.clone()
    };
    let base = if incoming.confidence > existing.confidence {
        incoming
    } else {
        existing.clone()
    };
    FrameCaption {
        timestamp,
        confidence,
        ocr,
        ..base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> CaptionProcessor {
        CaptionProcessor::new(ProcessorConfig::default(), SelectorConfig::default())
    }

    fn caption(index: u32, timestamp: f64, text: &str, confidence: f64) -> FrameCaption {
        FrameCaption::new(
            scribe_models::frame_caption_id(index),
            timestamp,
            text,
            "moondream:1.8b",
            confidence,
            CaptionPass::Fast,
        )
    }

    fn batch(frames: Vec<FrameCaption>) -> CaptionsOutput {
        CaptionsOutput {
            source_file: "session.mp4".to_string(),
            total_frames: frames.len(),
            frames,
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_near_duplicates() {
        let (merged, removed) = processor().merge_duplicates(vec![
            caption(0, 10.0, "Price chart near VWAP support", 0.6),
            caption(1, 11.0, "Price chart near VWAP support", 0.8).with_ocr("VWAP 451"),
            caption(2, 20.0, "Price chart near VWAP support", 0.6),
        ]);
        assert_eq!(removed, 1);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].frame, "frame_0001.jpg");
        assert_eq!(merged[0].timestamp, 10.5);
        assert_eq!(merged[0].confidence, 0.8);
        assert_eq!(merged[0].ocr, "VWAP 451");
    }

    #[test]
    fn test_merge_prefers_existing_on_tie_and_longer_ocr() {
        let (merged, _) = processor().merge_duplicates(vec![
            caption(0, 0.0, "Speaker at desk", 0.7).with_ocr("SPY 450 VWAP 451 RSI"),
            caption(1, 1.0, "Speaker at desk", 0.7).with_ocr("SPY 450 VWAP 451 RSI 62"),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].frame, "frame_0000.jpg");
        assert_eq!(merged[0].ocr, "SPY 450 VWAP 451 RSI 62");

        // Both sides have OCR, so identical captions alone do not merge
        let (apart, _) = processor().merge_duplicates(vec![
            caption(0, 0.0, "Speaker at desk", 0.7).with_ocr("SPY 450 QQQ"),
            caption(1, 1.0, "Speaker at desk", 0.7).with_ocr("SPY 450 IWM"),
        ]);
        assert_eq!(apart.len(), 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let processor = processor();
        let (once, _) = processor.merge_duplicates(vec![
            caption(0, 0.0, "Candle chart breaking out", 0.7),
            caption(1, 1.5, "Candle chart breaking out", 0.7),
            caption(2, 3.0, "Candle chart breaking out", 0.9),
            caption(3, 30.0, "Speaker on camera", 0.7),
        ]);
        let (twice, removed) = processor.merge_duplicates(once.clone());
        assert_eq!(once, twice);
        assert_eq!(removed, 0);

        let mut doubled = once.clone();
        doubled.extend(once.clone());
        let (with_self, _) = processor.merge_duplicates(doubled);
        assert_eq!(with_self, once);
    }

    #[test]
    fn test_merge_is_idempotent_with_blank_caption() {
        let processor = processor();
        let (once, _) = processor.merge_duplicates(vec![caption(0, 4.0, "", 0.7)]);
        assert_eq!(once.len(), 1);

        let mut doubled = once.clone();
        doubled.extend(once.clone());
        let (with_self, removed) = processor.merge_duplicates(doubled);
        assert_eq!(with_self, once);
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_filler_only_captions_are_dropped() {
        let set = processor().process(
            &batch(vec![
                caption(0, 0.0, "This image shows", 0.7),
                caption(1, 0.5, "We can see", 0.7),
                caption(2, 30.0, "Candle chart near VWAP", 0.7),
            ]),
            None,
        );
        assert_eq!(set.total_frames, 3);
        assert_eq!(set.processed_count, 1);
        assert!(set.captions.iter().all(|c| !c.caption.is_empty()));
        assert!(set.key_frames.iter().all(|c| !c.caption.is_empty()));
        assert_eq!(set.key_frames.len(), 1);
        assert_eq!(set.key_frames[0].frame, "frame_0002.jpg");

        let only_filler = processor().process(
            &batch(vec![
                caption(0, 0.0, "This image shows", 0.7),
                caption(1, 0.5, "We can see", 0.7),
            ]),
            None,
        );
        assert!(only_filler.captions.is_empty());
        assert!(only_filler.key_frames.is_empty());
    }

    #[test]
    fn test_key_frame_preview_matches_processed_selection() {
        let processor = processor();
        let mut frames: Vec<FrameCaption> = (0..30)
            .map(|i| caption(i, i as f64 * 10.0, "Speaker talking to camera", 0.6))
            .collect();
        frames[7] = caption(7, 70.0, "this image shows a bullish chart with the wap", 0.8)
            .with_ocr("VWAP 451 MACD 1.2 RSI 62");
        frames[8] = caption(8, 71.0, "A bull chart with VWAP", 0.7)
            .with_ocr("VWAP 451 MACD 1.2 RSI 62");
        frames[19] = caption(19, 190.0, "rsi climbing above seventy", 0.7);
        let raw = batch(frames.clone());

        let preview: Vec<String> = processor
            .select_key_frames(&frames, None)
            .into_iter()
            .map(|c| c.frame)
            .collect();
        let processed = processor.process(&raw, None);
        assert!(processed.token_budget_met);
        let emitted: Vec<String> = processed.key_frames.into_iter().map(|c| c.frame).collect();
        assert_eq!(preview, emitted);
        assert!(emitted.contains(&"frame_0007.jpg".to_string()));
        assert!(!emitted.contains(&"frame_0008.jpg".to_string()));
    }

    #[test]
    fn test_merge_respects_window() {
        let (merged, removed) = processor().merge_duplicates(vec![
            caption(0, 0.0, "Same caption text", 0.7),
            caption(1, 2.5, "Same caption text", 0.7),
        ]);
        assert_eq!(removed, 0);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_budget_reduces_frames_then_length() {
        let config = ProcessorConfig {
            token_budget: 60,
            ..Default::default()
        };
        let processor = CaptionProcessor::new(config, SelectorConfig::default());
        let long = "Price consolidating under the prior day high while volume builds into the close of the session";
        let frames: Vec<FrameCaption> = (0..10)
            .map(|i| caption(i, i as f64 * 30.0, long, 0.5 + i as f64 * 0.01))
            .collect();

        let fit = processor.fit_to_budget(frames);
        assert!(fit.optimized);
        assert!(fit.met);
        assert!(fit.tokens <= 60);
        assert!(fit.frames.len() < 10);
        assert!(fit.frames.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        // highest-confidence frames survive
        assert!(fit.frames.iter().any(|c| c.frame == "frame_0009.jpg"));
    }

    #[test]
    fn test_budget_reports_unavoidable_overrun() {
        let config = ProcessorConfig {
            token_budget: 1,
            ..Default::default()
        };
        let processor = CaptionProcessor::new(config, SelectorConfig::default());
        let fit = processor.fit_to_budget(vec![caption(0, 0.0, &"word ".repeat(30), 0.7)]);
        assert!(fit.optimized);
        assert!(!fit.met);
        assert_eq!(fit.frames.len(), 1);
        assert!(fit.frames[0].caption.chars().count() <= 16);
    }

    #[test]
    fn test_process_end_to_end() {
        let mut frames: Vec<FrameCaption> = (0..20)
            .map(|i| caption(i, i as f64 * 10.0, "This image shows a bullish candlestick chart at the wap", 0.7))
            .collect();
        frames.push(caption(20, 0.5, "This image shows a bullish candlestick chart at the wap", 0.7));

        let set = processor().process(&batch(frames), None);
        assert_eq!(set.total_frames, 21);
        assert_eq!(set.processed_count, 20);
        assert_eq!(set.processing_stats.duplicates_removed, 1);
        assert_eq!(set.processing_stats.indicators_normalized, 21);
        assert!(set.key_frames.len() <= 12);
        assert!(set.captions[0].caption.starts_with("A bull candle chart at the VWAP"));
        assert!(set.processing_stats.compression_ratio < 1.0);
        assert!(set.token_budget_met);
        assert!(set.fast_pass.is_none());
    }

    #[test]
    fn test_pass_split_when_both_present() {
        let mut rich = caption(1, 30.0, "Detailed chart with EMA", 0.9);
        rich.pass = CaptionPass::Rich;
        rich.model = "qwen2.5vl:7b".to_string();
        let set = processor().process(&batch(vec![caption(0, 0.0, "Chart", 0.7), rich]), None);
        assert_eq!(set.fast_pass.as_ref().map(Vec::len), Some(1));
        assert_eq!(set.rich_pass.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_empty_batch() {
        let set = processor().process(&batch(vec![]), None);
        assert!(set.captions.is_empty());
        assert!(set.key_frames.is_empty());
        assert_eq!(set.processing_stats.compression_ratio, 1.0);
        assert!(set.token_budget_met);
        assert!(!set.token_optimized);
    }
}
