//! Pipeline configuration.

use std::time::Duration;

use scribe_vision::VisionClientConfig;

use crate::error::PipelineError;
use crate::processor::ProcessorConfig;
use crate::selector::SelectorConfig;

const MAX_WORKERS: usize = 16;
const MAX_KEY_FRAMES: usize = 200;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Inference service client settings
    pub vision: VisionClientConfig,
    /// Fast-pass model run over every frame
    pub caption_model: String,
    /// High-fidelity model for the second pass
    pub rich_model: String,
    /// Re-caption selected key frames with the rich model
    pub two_pass: bool,
    /// Concurrent captioning requests
    pub workers: usize,
    /// Deadline for the model availability check
    pub availability_timeout: Duration,
    /// Deadline for all captioning passes together
    pub caption_timeout: Duration,
    /// Attempts at the availability check before degrading
    pub availability_attempts: u32,
    /// Print full diagnostics instead of a one-line warning
    pub verbose: bool,
    pub processor: ProcessorConfig,
    pub selector: SelectorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vision: VisionClientConfig::default(),
            caption_model: "moondream:1.8b".to_string(),
            rich_model: "qwen2.5vl:7b".to_string(),
            two_pass: false,
            workers: 4,
            availability_timeout: Duration::from_secs(10),
            caption_timeout: Duration::from_secs(300),
            availability_attempts: 3,
            verbose: false,
            processor: ProcessorConfig::default(),
            selector: SelectorConfig::default(),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let vision = VisionClientConfig::from_env();
        let max_retries = vision.max_retries;

        Self {
            vision,
            caption_model: std::env::var("SCRIBE_CAPTION_MODEL").unwrap_or(defaults.caption_model),
            rich_model: std::env::var("SCRIBE_RICH_MODEL").unwrap_or(defaults.rich_model),
            two_pass: env_flag("SCRIBE_TWO_PASS"),
            workers: std::env::var("SCRIBE_CAPTION_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            availability_timeout: Duration::from_secs(
                std::env::var("SCRIBE_AVAILABILITY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            caption_timeout: Duration::from_secs(
                std::env::var("SCRIBE_CAPTION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            availability_attempts: max_retries + 1,
            verbose: env_flag("SCRIBE_VERBOSE"),
            processor: ProcessorConfig {
                max_key_frames: std::env::var("SCRIBE_MAX_KEY_FRAMES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.processor.max_key_frames),
                token_budget: std::env::var("SCRIBE_TOKEN_BUDGET")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.processor.token_budget),
                ..defaults.processor
            },
            selector: defaults.selector,
        }
    }

    /// Check ranges and formats; every problem is reported, not just the first.
    pub fn validate(&self) -> Vec<PipelineError> {
        let mut errors = Vec::new();

        if self.caption_model.trim().is_empty() {
            errors.push(PipelineError::validation(
                "caption model",
                "",
                "model name cannot be empty",
            ));
        }
        if self.two_pass && self.rich_model.trim().is_empty() {
            errors.push(PipelineError::validation(
                "rich model",
                "",
                "model name cannot be empty when two-pass captioning is enabled",
            ));
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            errors.push(PipelineError::validation(
                "caption workers",
                self.workers,
                format!("worker count must be between 1 and {}", MAX_WORKERS),
            ));
        }
        if !(1..=MAX_KEY_FRAMES).contains(&self.processor.max_key_frames) {
            errors.push(PipelineError::validation(
                "max key frames",
                self.processor.max_key_frames,
                format!("frame count must be between 1 and {}", MAX_KEY_FRAMES),
            ));
        }
        if self.processor.token_budget == 0 {
            errors.push(PipelineError::validation(
                "token budget",
                0,
                "token budget must be positive",
            ));
        }
        match url::Url::parse(&self.vision.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(_) | Err(_) => errors.push(PipelineError::validation(
                "vision service url",
                &self.vision.base_url,
                "URL must start with http:// or https://",
            )),
        }

        errors
    }
}
