//! Shared data models for the scribe caption pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Extracted frames and frame-list documents
//! - Frame captions and caption batches
//! - Transcripts
//! - Processed caption sets and statistics
//! - Input/output analysis documents

pub mod caption;
pub mod document;
pub mod error;
pub mod frame;
pub mod processed;
pub mod timestamp;
pub mod transcript;

// Re-export common types
pub use caption::{clamp_confidence, CaptionPass, CaptionsOutput, FrameCaption, MAX_CONFIDENCE};
pub use document::{
    AnalysisDocument, AnalysisOutput, CaptionFallback, FallbackStrategy, InputDocument,
    VideoMetadata,
};
pub use error::{ModelError, ModelResult};
pub use frame::{frame_caption_id, Frame, FrameList, ImageSource};
pub use processed::{estimate_tokens, ProcessedCaptionSet, ProcessingStats, CHARS_PER_TOKEN};
pub use timestamp::{clamp_to_duration, format_seconds, validate_timestamp, TimestampError};
pub use transcript::{Transcript, TranscriptSegment};
