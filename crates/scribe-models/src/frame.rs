//! Extracted video frame models.
//!
//! Frames are produced by the extraction collaborator and are read-only to
//! the caption pipeline.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One sampled still image from a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Frame {
    /// Sequential frame index assigned by the extractor
    #[serde(rename = "frame_number", alias = "index")]
    pub index: u32,

    /// Position in the video (seconds)
    pub timestamp: f64,

    /// Inline image bytes, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Image location on the local filesystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Frame {
    /// Create a frame backed by inline base64 data.
    pub fn inline(index: u32, timestamp: f64, data: impl Into<String>) -> Self {
        Self {
            index,
            timestamp,
            data: Some(data.into()),
            path: None,
        }
    }

    /// Create a frame backed by an image file.
    pub fn on_disk(index: u32, timestamp: f64, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            timestamp,
            data: None,
            path: Some(path.into()),
        }
    }

    /// Identifier used by captions derived from this frame.
    pub fn caption_id(&self) -> String {
        frame_caption_id(self.index)
    }

    /// Where the image payload lives, if anywhere.
    pub fn image_source(&self) -> Option<ImageSource<'_>> {
        match (&self.data, &self.path) {
            (Some(data), _) if !data.is_empty() => Some(ImageSource::Inline(data)),
            (_, Some(path)) if !path.as_os_str().is_empty() => Some(ImageSource::Path(path)),
            _ => None,
        }
    }
}

/// Borrowed view of a frame's image payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageSource<'a> {
    Inline(&'a str),
    Path(&'a std::path::Path),
}

/// Caption identifier for a frame index (`frame_0042.jpg`).
pub fn frame_caption_id(index: u32) -> String {
    format!("frame_{:04}.jpg", index)
}

/// Frame list document emitted by the extraction collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FrameList {
    #[serde(default)]
    pub source_file: String,

    /// Video duration in seconds (0 when unknown)
    #[serde(default)]
    pub duration: f64,

    /// Extraction interval in seconds
    #[serde(default)]
    pub frame_interval: u32,

    #[serde(default)]
    pub frame_count: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_size: Option<String>,

    pub frames: Vec<Frame>,
}

impl FrameList {
    /// Wrap a bare frame vector.
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self {
            frame_count: frames.len(),
            frames,
            ..Default::default()
        }
    }

    /// Frame count, preferring the actual list length.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
