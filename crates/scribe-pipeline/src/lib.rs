//! Caption decision layer.
//!
//! Turns raw per-frame captions and a transcript into a small set of key
//! frames within a token budget:
//! - `captioning`: drives the vision client, including the two-pass mode
//! - `processor` / `normalize`: cleanup, duplicate merging, budgeting
//! - `selector` / `transcript`: scoring and key-frame selection
//! - `recovery` / `error`: failure taxonomy, diagnostics and fallback

pub mod captioning;
pub mod config;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod processor;
pub mod recovery;
pub mod selector;
pub mod transcript;
pub mod vocabulary;

pub use captioning::{merge_rich_captions, Captioner};
pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use logging::{init_tracing, RunLogger};
pub use pipeline::{AnalysisReport, CaptionPipeline};
pub use processor::{BudgetFit, CaptionProcessor, ProcessorConfig};
pub use recovery::{
    plan_caption_fallback, Diagnostics, ErrorRecord, FallbackPlan, CAPTION_OPERATION,
};
pub use selector::{FrameSelector, PriorityTier, ScoreWeights, ScoredFrame, SelectorConfig};
pub use transcript::{KeywordEntry, TranscriptKeywordIndex};
pub use vocabulary::{DomainTables, Indicator, Vocabulary};
