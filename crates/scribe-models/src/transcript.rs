//! Transcript models from the transcription collaborator.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A timed span of transcribed speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub id: u32,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(id: u32, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            id,
            start,
            end,
            text: text.into(),
        }
    }
}

/// Full transcript of a video.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Transcript {
    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,

    #[serde(default)]
    pub language: String,

    /// Duration in seconds (0 when unknown)
    #[serde(default)]
    pub duration: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Transcript {
    /// Build a transcript from segments; duration is the latest segment end.
    pub fn from_segments(segments: Vec<TranscriptSegment>) -> Self {
        let duration = segments.iter().map(|s| s.end).fold(0.0, f64::max);
        let text = segments
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            text,
            segments,
            duration,
            ..Default::default()
        }
    }

    /// True when there is no speech to work with.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.text.trim().is_empty()
    }

    /// Known duration, falling back to the last segment end.
    pub fn effective_duration(&self) -> f64 {
        if self.duration > 0.0 {
            self.duration
        } else {
            self.segments.iter().map(|s| s.end).fold(0.0, f64::max)
        }
    }
}
