//! Vision client error types.

use std::path::PathBuf;

use thiserror::Error;

pub type VisionResult<T> = Result<T, VisionError>;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Vision service unavailable at {url}: {reason}")]
    ServiceUnavailable { url: String, reason: String },

    #[error("Model '{model}' not found (available: {})", format_available(.available))]
    ModelNotFound { model: String, available: Vec<String> },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid frame {frame}: {reason}")]
    Validation { frame: String, reason: String },

    #[error("Vision service returned {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid base64 image data: {0}")]
    ImageDecode(#[from] base64::DecodeError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        "none".to_string()
    } else {
        available.join(", ")
    }
}

impl VisionError {
    pub fn unavailable(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::ServiceUnavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn validation(frame: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            frame: frame.into(),
            reason: reason.into(),
        }
    }

    /// Transient failures worth another attempt.
    ///
    /// Missing models, bad frames and cancellation are permanent for this run.
    pub fn is_retryable(&self) -> bool {
        match self {
            VisionError::ServiceUnavailable { .. }
            | VisionError::Timeout(_)
            | VisionError::InvalidResponse(_) => true,
            VisionError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            VisionError::Network(e) => !e.is_builder(),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            VisionError::Timeout(_) => true,
            VisionError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(VisionError::unavailable("http://localhost:11434", "refused").is_retryable());
        assert!(VisionError::HttpStatus { status: 503, body: String::new() }.is_retryable());
        assert!(VisionError::Timeout(60).is_retryable());
        assert!(!VisionError::HttpStatus { status: 400, body: String::new() }.is_retryable());

        assert!(!VisionError::Cancelled.is_retryable());
        assert!(!VisionError::validation("frame_0001.jpg", "no image").is_retryable());
        assert!(!VisionError::ModelNotFound {
            model: "llava".to_string(),
            available: vec![],
        }
        .is_retryable());
    }

    #[test]
    fn test_model_not_found_lists_alternatives() {
        let err = VisionError::ModelNotFound {
            model: "qwen2.5vl:7b".to_string(),
            available: vec!["A".to_string(), "B".to_string()],
        };
        assert_eq!(err.to_string(), "Model 'qwen2.5vl:7b' not found (available: A, B)");

        let none = VisionError::ModelNotFound {
            model: "x".to_string(),
            available: vec![],
        };
        assert!(none.to_string().ends_with("(available: none)"));
    }
}
