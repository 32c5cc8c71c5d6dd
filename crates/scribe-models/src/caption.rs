//! Frame caption models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Upper bound on any caption confidence estimate.
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Which captioning pass produced a caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptionPass {
    /// Fast, lower-fidelity model run over every frame
    #[default]
    Fast,
    /// High-fidelity model run over a selected subset
    Rich,
}

impl CaptionPass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionPass::Fast => "fast",
            CaptionPass::Rich => "rich",
        }
    }
}

impl std::fmt::Display for CaptionPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caption for a single video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameCaption {
    /// Frame identifier (`frame_0001.jpg`)
    pub frame: String,

    /// Position in the video (seconds)
    pub timestamp: f64,

    /// Free-text description of the frame
    pub caption: String,

    /// Recognized on-screen text
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ocr: String,

    /// Model that produced the caption
    pub model: String,

    /// Heuristic confidence in [0, 0.95]
    pub confidence: f64,

    /// Pass that produced the caption
    #[serde(rename = "source")]
    pub pass: CaptionPass,
}

impl FrameCaption {
    /// Create a caption; confidence is clamped into the allowed range.
    pub fn new(
        frame: impl Into<String>,
        timestamp: f64,
        caption: impl Into<String>,
        model: impl Into<String>,
        confidence: f64,
        pass: CaptionPass,
    ) -> Self {
        Self {
            frame: frame.into(),
            timestamp,
            caption: caption.into(),
            ocr: String::new(),
            model: model.into(),
            confidence: clamp_confidence(confidence),
            pass,
        }
    }

    /// Attach OCR text.
    pub fn with_ocr(mut self, ocr: impl Into<String>) -> Self {
        self.ocr = ocr.into();
        self
    }

    /// Character count of caption plus OCR text.
    pub fn text_len(&self) -> usize {
        self.caption.chars().count() + self.ocr.chars().count()
    }

    pub fn has_ocr(&self) -> bool {
        !self.ocr.is_empty()
    }
}

/// Clamp a confidence estimate into `[0, MAX_CONFIDENCE]`.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, MAX_CONFIDENCE)
}

/// Raw caption batch as produced by the captioning client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CaptionsOutput {
    #[serde(default)]
    pub source_file: String,

    /// Unix seconds
    pub processed_at: i64,

    pub total_frames: usize,

    #[serde(rename = "processed_time_seconds")]
    pub processed_time_secs: f64,

    #[serde(rename = "models_used")]
    pub models: Vec<String>,

    pub frames: Vec<FrameCaption>,
}
