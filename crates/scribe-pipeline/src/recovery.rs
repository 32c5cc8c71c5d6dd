//! Error recovery and captioning fallback.
//!
//! An [`ErrorRecord`] accumulates the failures of one named operation,
//! decides whether another attempt is worthwhile and renders diagnostics.
//! When captioning ultimately fails, [`plan_caption_fallback`] picks how the
//! analysis continues without captions.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use scribe_models::{CaptionFallback, FallbackStrategy};

use crate::error::{ErrorKind, PipelineError};

/// Operation name used for the captioning stage.
pub const CAPTION_OPERATION: &str = "Caption Generation";

/// Attempts and failures of one named operation.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    operation: String,
    attempt_count: u32,
    errors: Vec<PipelineError>,
    recoverable: bool,
    remedies: Vec<String>,
}

/// Serializable snapshot of an [`ErrorRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub operation: String,
    pub attempt_count: u32,
    pub errors: Vec<String>,
    pub error_kinds: Vec<ErrorKind>,
    pub recoverable: bool,
    pub remedies: Vec<String>,
}

impl ErrorRecord {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            attempt_count: 0,
            errors: Vec::new(),
            recoverable: true,
            remedies: Vec::new(),
        }
    }

    /// Record a failed attempt and collect its remedies.
    pub fn record(&mut self, error: PipelineError) {
        self.attempt_count += 1;
        for remedy in error.remedies() {
            if !self.remedies.contains(&remedy) {
                self.remedies.push(remedy);
            }
        }
        if !error.is_retryable() {
            self.recoverable = false;
        }
        self.errors.push(error);
    }

    /// Record a non-fatal problem without counting it as an attempt.
    pub fn note(&mut self, error: PipelineError) {
        for remedy in error.remedies() {
            if !self.remedies.contains(&remedy) {
                self.remedies.push(remedy);
            }
        }
        self.errors.push(error);
    }

    /// Whether another attempt is worthwhile.
    ///
    /// False once `max_attempts` is reached or any recorded error is
    /// permanent (validation, missing model); the record then stays
    /// unrecoverable.
    pub fn should_retry(&mut self, max_attempts: u32) -> bool {
        if self.attempt_count >= max_attempts {
            self.recoverable = false;
        }
        self.recoverable
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn errors(&self) -> &[PipelineError] {
        &self.errors
    }

    pub fn last_error(&self) -> Option<&PipelineError> {
        self.errors.last()
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn remedies(&self) -> &[String] {
        &self.remedies
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            operation: self.operation.clone(),
            attempt_count: self.attempt_count,
            errors: self.errors.iter().map(ToString::to_string).collect(),
            error_kinds: self.errors.iter().map(PipelineError::kind).collect(),
            recoverable: self.recoverable,
            remedies: self.remedies.clone(),
        }
    }

    /// Human-readable report: latest error, remedies and fallback options.
    pub fn diagnostic_message(&self) -> String {
        let Some(latest) = self.last_error() else {
            return format!("{} completed successfully", self.operation);
        };

        let mut message = String::new();
        let _ = writeln!(
            message,
            "{} failed after {} attempt{}",
            self.operation,
            self.attempt_count,
            if self.attempt_count == 1 { "" } else { "s" }
        );
        let _ = writeln!(message, "\nLatest error:\n  {}", latest);

        if !self.remedies.is_empty() {
            let _ = writeln!(message, "\nSuggested remedies:");
            for remedy in &self.remedies {
                let _ = writeln!(message, "  - {}", remedy);
            }
        }

        if self.operation == CAPTION_OPERATION {
            let _ = writeln!(message, "\nFallback options:");
            let _ = writeln!(message, "  - Continue without captions (unset caption generation)");
            let _ = writeln!(message, "  - Use transcript-only analysis");
            let _ = writeln!(message, "  - Try a different model: SCRIBE_CAPTION_MODEL=moondream:1.8b");
        }

        message
    }
}

/// How the analysis continues after captioning failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPlan {
    pub strategy: FallbackStrategy,
    pub message: String,
    pub error_kind: ErrorKind,
}

impl FallbackPlan {
    /// Record embedded in the output document.
    pub fn to_caption_fallback(&self) -> CaptionFallback {
        CaptionFallback {
            strategy: self.strategy,
            message: self.message.clone(),
            error_kind: self.error_kind.to_string(),
        }
    }
}

/// Degrade to transcript-only analysis when a transcript exists, else to
/// bare frame metadata. Every failure kind degrades; none aborts the run.
pub fn plan_caption_fallback(error: &PipelineError, has_transcript: bool) -> FallbackPlan {
    let strategy = if has_transcript {
        FallbackStrategy::TranscriptOnly
    } else {
        FallbackStrategy::FrameMetadataOnly
    };
    let continuation = match strategy {
        FallbackStrategy::TranscriptOnly => "continuing with transcript-only analysis",
        FallbackStrategy::FrameMetadataOnly => "continuing with frame metadata only",
    };

    let cause = match error {
        PipelineError::ServiceUnavailable { .. } => "Vision service unavailable".to_string(),
        PipelineError::ModelNotFound { model, .. } => {
            format!("Model {} not installed (ollama pull {})", model, model)
        }
        PipelineError::ProcessingTimeout { .. } => "Caption generation timed out".to_string(),
        PipelineError::TokenBudgetExceeded { .. } => "Caption token budget exceeded".to_string(),
        PipelineError::ValidationFailure { field, .. } => format!("Invalid {}", field),
    };

    FallbackPlan {
        strategy,
        message: format!("{}, {}", cause, continuation),
        error_kind: error.kind(),
    }
}
