//! Processed caption set emitted by the caption pipeline.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::caption::FrameCaption;

/// Characters per language-model token used for budgeting.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token cost of a set of captions (caption + OCR characters / 4).
pub fn estimate_tokens(captions: &[FrameCaption]) -> usize {
    captions.iter().map(FrameCaption::text_len).sum::<usize>() / CHARS_PER_TOKEN
}

/// Metrics collected while processing captions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingStats {
    /// Caption + OCR characters before normalization
    pub original_caption_length: usize,
    /// Caption + OCR characters after normalization and truncation
    pub compressed_length: usize,
    /// compressed / original (1.0 when nothing was supplied)
    pub compression_ratio: f64,
    /// Alias spellings rewritten to their canonical form
    pub indicators_normalized: usize,
    /// Captions folded into a near-duplicate neighbour
    pub duplicates_removed: usize,
    pub processing_time_ms: u64,
}

/// Cleaned captions plus the selected key frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ProcessedCaptionSet {
    #[serde(default)]
    pub source_file: String,

    /// Normalized, deduplicated captions in chronological order
    #[serde(rename = "frames")]
    pub captions: Vec<FrameCaption>,

    /// Selected key frames in chronological order
    pub key_frames: Vec<FrameCaption>,

    /// Fast-pass captions, present only when both passes produced output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_pass: Option<Vec<FrameCaption>>,

    /// Rich-pass captions, present only when both passes produced output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_pass: Option<Vec<FrameCaption>>,

    pub total_frames: usize,

    #[serde(rename = "processed_frames_count")]
    pub processed_count: usize,

    /// Key frames were reduced or truncated to meet the token budget
    pub token_optimized: bool,

    /// Estimated key-frame cost is within the token budget
    pub token_budget_met: bool,

    /// Estimated key-frame token cost
    pub estimated_tokens: usize,

    pub processing_stats: ProcessingStats,
}

impl ProcessedCaptionSet {
    /// Recompute the token estimate of the key frames.
    pub fn key_frame_tokens(&self) -> usize {
        estimate_tokens(&self.key_frames)
    }

    /// Compact view handed to the downstream text-analysis stage.
    pub fn downstream_payload(&self) -> DownstreamPayload<'_> {
        DownstreamPayload {
            source_file: &self.source_file,
            frames: &self.key_frames,
            stats: DownstreamStats {
                total_frames: self.total_frames,
                key_frames: self.key_frames.len(),
                compression_ratio: self.processing_stats.compression_ratio,
                token_optimized: self.token_optimized,
            },
        }
    }
}

/// Compact key-frame document for the downstream analysis prompt.
#[derive(Debug, Serialize)]
pub struct DownstreamPayload<'a> {
    pub source_file: &'a str,
    pub frames: &'a [FrameCaption],
    pub stats: DownstreamStats,
}

#[derive(Debug, Serialize)]
pub struct DownstreamStats {
    pub total_frames: usize,
    pub key_frames: usize,
    pub compression_ratio: f64,
    pub token_optimized: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::CaptionPass;

    fn caption(text: &str, ocr: &str) -> FrameCaption {
        FrameCaption::new("frame_0001.jpg", 0.0, text, "m", 0.8, CaptionPass::Fast).with_ocr(ocr)
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(&[]), 0);
        // 12 + 4 chars = 16 / 4
        assert_eq!(estimate_tokens(&[caption("Candle chart", "VWAP")]), 4);
        // Integer division rounds down
        assert_eq!(estimate_tokens(&[caption("abc", "")]), 0);
    }

    #[test]
    fn test_downstream_payload_shape() {
        let set = ProcessedCaptionSet {
            source_file: "video.mp4".to_string(),
            key_frames: vec![caption("Chart", "")],
            total_frames: 40,
            token_optimized: true,
            ..Default::default()
        };
        let json = serde_json::to_value(set.downstream_payload()).unwrap();
        assert_eq!(json["source_file"], "video.mp4");
        assert_eq!(json["stats"]["key_frames"], 1);
        assert_eq!(json["stats"]["total_frames"], 40);
        assert_eq!(json["stats"]["token_optimized"], true);
    }

    #[test]
    fn test_pass_split_omitted_when_absent() {
        let json = serde_json::to_value(ProcessedCaptionSet::default()).unwrap();
        assert!(json.get("fast_pass").is_none());
        assert!(json.get("rich_pass").is_none());
        assert!(json.get("frames").is_some());
    }
}
