//! Pipeline error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use scribe_vision::VisionError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Closed set of failures the caption pipeline reports.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Vision service unavailable at {url}: {reason}")]
    ServiceUnavailable { url: String, reason: String },

    #[error("Model '{model}' not found (available: {})", format_models(.available))]
    ModelNotFound { model: String, available: Vec<String> },

    #[error("{operation} timed out (limit: {limit_secs}s)")]
    ProcessingTimeout { operation: String, limit_secs: u64 },

    #[error("{component} token budget exceeded: {tokens} tokens (budget: {budget})")]
    TokenBudgetExceeded {
        component: String,
        tokens: usize,
        budget: usize,
    },

    #[error("Validation failed for {field} ({value}): {reason}")]
    ValidationFailure {
        field: String,
        value: String,
        reason: String,
    },
}

fn format_models(models: &[String]) -> String {
    if models.is_empty() {
        "none".to_string()
    } else {
        models.join(", ")
    }
}

/// Taxonomy tag of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ServiceUnavailable,
    ModelNotFound,
    ProcessingTimeout,
    TokenBudgetExceeded,
    ValidationFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ServiceUnavailable => "ServiceUnavailable",
            ErrorKind::ModelNotFound => "ModelNotFound",
            ErrorKind::ProcessingTimeout => "ProcessingTimeout",
            ErrorKind::TokenBudgetExceeded => "TokenBudgetExceeded",
            ErrorKind::ValidationFailure => "ValidationFailure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn unavailable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, limit_secs: u64) -> Self {
        Self::ProcessingTimeout {
            operation: operation.into(),
            limit_secs,
        }
    }

    pub fn validation(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::ValidationFailure {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            PipelineError::ModelNotFound { .. } => ErrorKind::ModelNotFound,
            PipelineError::ProcessingTimeout { .. } => ErrorKind::ProcessingTimeout,
            PipelineError::TokenBudgetExceeded { .. } => ErrorKind::TokenBudgetExceeded,
            PipelineError::ValidationFailure { .. } => ErrorKind::ValidationFailure,
        }
    }

    /// Transient failures retried locally before surfacing.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::ServiceUnavailable { .. } | PipelineError::ProcessingTimeout { .. }
        )
    }

    /// Actionable remedies for the operator.
    pub fn remedies(&self) -> Vec<String> {
        match self {
            PipelineError::ServiceUnavailable { url, .. } => vec![
                "Start the inference service: ollama serve".to_string(),
                format!("Check the service is reachable: curl {}/api/tags", url),
                "Point SCRIBE_VISION_URL at the running service".to_string(),
            ],
            PipelineError::ModelNotFound { model, available } => {
                let mut remedies = vec![
                    format!("Pull the required model: ollama pull {}", model),
                    "List installed models: ollama list".to_string(),
                ];
                if !available.is_empty() {
                    remedies.push(format!(
                        "Set SCRIBE_CAPTION_MODEL to an installed model: {}",
                        available.join(", ")
                    ));
                }
                remedies
            }
            PipelineError::ProcessingTimeout { .. } => vec![
                "Use a faster model: SCRIBE_CAPTION_MODEL=moondream:1.8b".to_string(),
                "Extract fewer frames (larger frame interval)".to_string(),
                "Raise SCRIBE_CAPTION_WORKERS for more parallel requests".to_string(),
                "Raise SCRIBE_CAPTION_TIMEOUT_SECS".to_string(),
            ],
            PipelineError::TokenBudgetExceeded { .. } => vec![
                "Lower SCRIBE_MAX_KEY_FRAMES".to_string(),
                "Raise SCRIBE_TOKEN_BUDGET".to_string(),
            ],
            PipelineError::ValidationFailure { field, .. } => {
                vec![format!("Fix the value of {}", field)]
            }
        }
    }
}

impl From<VisionError> for PipelineError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::ServiceUnavailable { url, reason } => Self::ServiceUnavailable { url, reason },
            VisionError::ModelNotFound { model, available } => Self::ModelNotFound { model, available },
            VisionError::Timeout(secs) => Self::timeout("Inference request", secs),
            VisionError::Cancelled => Self::timeout("Caption generation", 0),
            VisionError::Validation { frame, reason } => Self::validation("frame", frame, reason),
            VisionError::ImageRead { path, source } => {
                Self::validation("frame path", path.display(), source.to_string())
            }
            VisionError::ImageDecode(e) => Self::validation("frame data", "base64", e.to_string()),
            VisionError::Network(e) if e.is_timeout() => Self::timeout("Inference request", 0),
            VisionError::Network(e) => {
                let url = e
                    .url()
                    .map(|u| u.origin().ascii_serialization())
                    .unwrap_or_else(|| "inference service".to_string());
                Self::unavailable(url, e.to_string())
            }
            VisionError::HttpStatus { status, body } => {
                Self::unavailable("inference service", format!("HTTP {}: {}", status, body))
            }
            VisionError::InvalidResponse(reason) => Self::unavailable("inference service", reason),
            VisionError::Json(e) => Self::unavailable("inference service", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(PipelineError::unavailable("http://localhost:11434", "refused").is_retryable());
        assert!(PipelineError::timeout("Caption generation", 300).is_retryable());
        assert!(!PipelineError::validation("workers", 0, "out of range").is_retryable());
        assert!(!PipelineError::ModelNotFound {
            model: "x".to_string(),
            available: vec![],
        }
        .is_retryable());
    }

    #[test]
    fn test_vision_errors_classify_into_taxonomy() {
        let cases = [
            (VisionError::unavailable("http://h", "down"), ErrorKind::ServiceUnavailable),
            (
                VisionError::ModelNotFound {
                    model: "m".to_string(),
                    available: vec!["A".to_string()],
                },
                ErrorKind::ModelNotFound,
            ),
            (VisionError::Timeout(60), ErrorKind::ProcessingTimeout),
            (VisionError::Cancelled, ErrorKind::ProcessingTimeout),
            (VisionError::validation("frame_0001.jpg", "no image"), ErrorKind::ValidationFailure),
            (
                VisionError::HttpStatus {
                    status: 500,
                    body: String::new(),
                },
                ErrorKind::ServiceUnavailable,
            ),
        ];
        for (vision, kind) in cases {
            assert_eq!(PipelineError::from(vision).kind(), kind);
        }
    }

    #[test]
    fn test_model_not_found_remedies() {
        let err = PipelineError::ModelNotFound {
            model: "qwen2.5vl:7b".to_string(),
            available: vec!["A".to_string(), "B".to_string()],
        };
        let remedies = err.remedies();
        assert_eq!(remedies[0], "Pull the required model: ollama pull qwen2.5vl:7b");
        assert!(remedies.iter().any(|r| r.ends_with("A, B")));
        assert_eq!(err.to_string(), "Model 'qwen2.5vl:7b' not found (available: A, B)");
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ErrorKind::TokenBudgetExceeded.to_string(), "TokenBudgetExceeded");
        assert_eq!(
            serde_json::to_value(ErrorKind::ModelNotFound).unwrap(),
            serde_json::json!("ModelNotFound")
        );
    }
}
