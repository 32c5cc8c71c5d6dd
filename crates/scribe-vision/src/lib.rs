//! Client for the vision-language inference service.
//!
//! Produces one [`FrameCaption`](scribe_models::FrameCaption) per extracted
//! frame by driving an Ollama-compatible HTTP API. The client owns:
//! - model-availability checks backed by a shared [`ModelCache`]
//! - bounded exponential-backoff retries with cancellable waits
//! - a fixed-size worker pool that returns partial results on partial failure

pub mod client;
pub mod confidence;
pub mod error;
pub mod model_cache;
pub mod pool;
pub mod retry;
pub mod types;

pub use client::{VisionClient, VisionClientConfig};
pub use confidence::{estimate_confidence, pass_for_model};
pub use error::{VisionError, VisionResult};
pub use model_cache::{ModelAvailability, ModelCache};
pub use pool::{CaptionBatch, FrameFailure, DEFAULT_WORKERS};
pub use retry::{cancellable_sleep, retry_with_cancel, FailureTracker, RetryConfig};
pub use types::DEFAULT_CAPTION_PROMPT;
