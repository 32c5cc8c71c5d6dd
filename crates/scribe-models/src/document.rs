//! Input and output documents.
//!
//! The pipeline accepts either a plain frame list (as written by the frame
//! extractor) or a full prior analysis document. Decoding tries each shape
//! in a fixed order and never guesses: if none matches, the caller gets
//! [`ModelError::UnrecognizedInputShape`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::frame::{Frame, FrameList};
use crate::processed::ProcessedCaptionSet;
use crate::transcript::Transcript;

/// Run metadata carried alongside an analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub duration: f64,
    /// Unix seconds
    #[serde(default)]
    pub processed_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper_backend: Option<String>,
    #[serde(default)]
    pub frame_interval: u32,
    #[serde(default)]
    pub frame_count: usize,
}

/// Prior analysis: transcript plus extracted frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisDocument {
    #[serde(default)]
    pub transcript: Transcript,
    pub frames: FrameList,
    #[serde(default)]
    pub metadata: VideoMetadata,
}

/// Accepted input shapes, in decode order.
#[derive(Debug, Clone)]
pub enum InputDocument {
    /// `{ "source_file": ..., "frames": [ ... ] }`
    FrameList(FrameList),
    /// `[ { "frame_number": ..., ... }, ... ]`
    BareFrames(Vec<Frame>),
    /// `{ "transcript": {...}, "frames": { "frames": [...] }, "metadata": {...} }`
    Analysis(AnalysisDocument),
}

impl InputDocument {
    /// Shape names in the order they are tried.
    pub const SHAPES: [&'static str; 3] = ["frame list", "bare frame array", "analysis document"];

    /// Decode raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> ModelResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: Value) -> ModelResult<Self> {
        if let Ok(list) = serde_json::from_value::<FrameList>(value.clone()) {
            return Ok(Self::FrameList(list));
        }
        if let Ok(frames) = serde_json::from_value::<Vec<Frame>>(value.clone()) {
            return Ok(Self::BareFrames(frames));
        }
        if let Ok(analysis) = serde_json::from_value::<AnalysisDocument>(value) {
            return Ok(Self::Analysis(analysis));
        }
        Err(ModelError::UnrecognizedInputShape {
            tried: Self::SHAPES.join(", "),
        })
    }

    /// Shape name of the decoded document.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::FrameList(_) => Self::SHAPES[0],
            Self::BareFrames(_) => Self::SHAPES[1],
            Self::Analysis(_) => Self::SHAPES[2],
        }
    }

    /// Normalize into an analysis document; frame-only inputs get an empty transcript.
    pub fn into_analysis(self) -> AnalysisDocument {
        match self {
            Self::FrameList(frames) => AnalysisDocument {
                metadata: VideoMetadata {
                    source_file: frames.source_file.clone(),
                    duration: frames.duration,
                    frame_interval: frames.frame_interval,
                    frame_count: frames.len(),
                    ..Default::default()
                },
                frames,
                ..Default::default()
            },
            Self::BareFrames(frames) => {
                let frames = FrameList::from_frames(frames);
                AnalysisDocument {
                    metadata: VideoMetadata {
                        frame_count: frames.len(),
                        ..Default::default()
                    },
                    frames,
                    ..Default::default()
                }
            }
            Self::Analysis(analysis) => analysis,
        }
    }
}

/// How the analysis continued after captioning failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Captions dropped; downstream works from the transcript
    TranscriptOnly,
    /// No transcript either; downstream gets bare frame metadata
    FrameMetadataOnly,
}

impl FallbackStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            FallbackStrategy::TranscriptOnly => "Transcript-only analysis",
            FallbackStrategy::FrameMetadataOnly => "Frame metadata only",
        }
    }
}

/// Record of a captioning degradation, embedded in the output.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptionFallback {
    pub strategy: FallbackStrategy,
    pub message: String,
    /// Taxonomy name of the failure that triggered the fallback
    pub error_kind: String,
}

/// Analysis document extended with caption data.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisOutput {
    pub transcript: Transcript,
    pub frames: FrameList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captions: Option<ProcessedCaptionSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_fallback: Option<CaptionFallback>,
    pub metadata: VideoMetadata,
}

impl AnalysisOutput {
    /// Output without captions (degraded or nothing to caption).
    pub fn without_captions(analysis: AnalysisDocument) -> Self {
        Self {
            transcript: analysis.transcript,
            frames: analysis.frames,
            captions: None,
            caption_fallback: None,
            metadata: analysis.metadata,
        }
    }
}
