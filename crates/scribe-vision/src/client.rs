//! Vision service HTTP client.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use scribe_models::{validate_timestamp, Frame, FrameCaption, ImageSource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::confidence::{estimate_confidence, pass_for_model};
use crate::error::{VisionError, VisionResult};
use crate::model_cache::{ModelAvailability, ModelCache};
use crate::pool::{self, CaptionBatch};
use crate::retry::{retry_with_cancel, RetryConfig};
use crate::types::{GenerateRequest, GenerateResponse, TagsResponse, DEFAULT_CAPTION_PROMPT};

/// Configuration for the vision client.
#[derive(Debug, Clone)]
pub struct VisionClientConfig {
    /// Base URL of the inference service
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// First backoff delay (doubles per retry)
    pub base_delay: Duration,
    /// Backoff cap
    pub max_delay: Duration,
    /// Caption prompt; the trading-chart prompt when unset
    pub prompt: Option<String>,
}

impl Default for VisionClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            prompt: None,
        }
    }
}

impl VisionClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("SCRIBE_VISION_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.base_url),
            request_timeout: Duration::from_secs(
                std::env::var("SCRIBE_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            max_retries: std::env::var("SCRIBE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            prompt: std::env::var("SCRIBE_CAPTION_PROMPT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            ..defaults
        }
    }

    /// Base URL without a trailing slash.
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_CAPTION_PROMPT)
    }
}

/// Client for the vision-language inference service.
///
/// Cheap to clone; clones share the HTTP connection pool and the model cache.
#[derive(Debug, Clone)]
pub struct VisionClient {
    http: Client,
    config: Arc<VisionClientConfig>,
    models: Arc<ModelCache>,
}

impl VisionClient {
    /// Create a new vision client.
    pub fn new(config: VisionClientConfig) -> VisionResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(VisionError::Network)?;

        Ok(Self {
            http,
            config: Arc::new(config),
            models: Arc::new(ModelCache::new()),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> VisionResult<Self> {
        Self::new(VisionClientConfig::from_env())
    }

    /// Share an existing model cache.
    pub fn with_model_cache(mut self, models: Arc<ModelCache>) -> Self {
        self.models = models;
        self
    }

    pub fn config(&self) -> &VisionClientConfig {
        &self.config
    }

    pub fn model_cache(&self) -> &Arc<ModelCache> {
        &self.models
    }

    fn retry_config(&self, operation: &str) -> RetryConfig {
        RetryConfig::new(operation)
            .with_max_retries(self.config.max_retries)
            .with_base_delay(self.config.base_delay)
            .with_max_delay(self.config.max_delay)
    }

    /// List model names from the registry, in registry order.
    ///
    /// Any failure to reach or decode the registry is `ServiceUnavailable`.
    pub async fn list_models(&self) -> VisionResult<Vec<String>> {
        let url = self.config.endpoint("/api/tags");
        debug!(url = %url, "Listing vision models");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| VisionError::unavailable(&self.config.base_url, e))?;

        if !response.status().is_success() {
            return Err(VisionError::unavailable(
                &self.config.base_url,
                format!("model registry returned {}", response.status()),
            ));
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            VisionError::unavailable(&self.config.base_url, format!("invalid model listing: {}", e))
        })?;
        Ok(tags.names())
    }

    /// Fail fast unless `model` is installed, consulting the cache first.
    pub async fn ensure_model_available(&self, model: &str) -> VisionResult<()> {
        let availability = match self.models.get(model) {
            Some(cached) => cached,
            None => {
                let listing = self.list_models().await?;
                self.models.refresh(model, listing)
            }
        };

        match availability {
            ModelAvailability::Available => Ok(()),
            ModelAvailability::Missing { available } => Err(VisionError::ModelNotFound {
                model: model.to_string(),
                available,
            }),
        }
    }

    /// Single generate call without retries.
    pub async fn generate_once(&self, request: &GenerateRequest) -> VisionResult<GenerateResponse> {
        let url = self.config.endpoint("/api/generate");

        let response = self.http.post(&url).json(request).send().await.map_err(|e| {
            if e.is_connect() {
                VisionError::unavailable(&self.config.base_url, e)
            } else if e.is_timeout() {
                VisionError::Timeout(self.config.request_timeout.as_secs())
            } else {
                VisionError::Network(e)
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // The registry changed under us; drop the stale positive answer.
            self.models.invalidate(&request.model);
            return Err(VisionError::ModelNotFound {
                model: request.model.clone(),
                available: self.models.available(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| VisionError::InvalidResponse(e.to_string()))
    }

    /// Generate with bounded retries and exponential backoff.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        cancel: &CancellationToken,
    ) -> VisionResult<GenerateResponse> {
        let config = self.retry_config("generate");
        retry_with_cancel(&config, cancel, |_| self.generate_once(request)).await
    }

    /// Describe raw image bytes with `model`, returning the response text.
    pub async fn describe_image(
        &self,
        image: &[u8],
        model: &str,
        cancel: &CancellationToken,
    ) -> VisionResult<String> {
        let request = GenerateRequest::new(model, self.config.prompt(), vec![STANDARD.encode(image)]);
        let response = self.generate(&request, cancel).await?;
        let text = response.response.trim().to_string();
        if text.is_empty() {
            return Err(VisionError::InvalidResponse("empty caption".to_string()));
        }
        Ok(text)
    }

    /// Caption one frame.
    pub async fn caption_frame(
        &self,
        frame: &Frame,
        model: &str,
        cancel: &CancellationToken,
    ) -> VisionResult<FrameCaption> {
        let frame_id = frame.caption_id();
        let timestamp = validate_timestamp(frame.timestamp)
            .map_err(|e| VisionError::validation(&frame_id, e.to_string()))?;
        let image = load_image(frame, &frame_id).await?;

        let text = self.describe_image(&image, model, cancel).await?;
        let confidence = estimate_confidence(&text, model);
        let ocr = extract_ocr_text(&text);

        debug!(frame = %frame_id, model = %model, confidence, "Captioned frame");

        Ok(
            FrameCaption::new(frame_id, timestamp, text, model, confidence, pass_for_model(model))
                .with_ocr(ocr),
        )
    }

    /// Caption frames with a bounded worker pool.
    ///
    /// Checks model availability first. Per-frame failures are returned in the
    /// batch; use [`CaptionBatch::into_result`] to treat a total failure as an
    /// error.
    pub async fn caption_frames(
        &self,
        frames: &[Frame],
        model: &str,
        workers: usize,
        cancel: &CancellationToken,
    ) -> VisionResult<CaptionBatch> {
        if frames.is_empty() {
            return Ok(CaptionBatch::default());
        }

        self.ensure_model_available(model).await?;

        info!(
            model = %model,
            frames = frames.len(),
            workers,
            "Captioning frames"
        );

        let batch = pool::caption_with_pool(self, frames.to_vec(), model, workers, cancel).await;

        if batch.failures.is_empty() {
            info!(model = %model, captions = batch.captions.len(), "Captioning complete");
        } else {
            warn!(
                model = %model,
                captions = batch.captions.len(),
                failed = batch.failures.len(),
                "Captioning completed with failures"
            );
        }

        Ok(batch)
    }
}

async fn load_image(frame: &Frame, frame_id: &str) -> VisionResult<Vec<u8>> {
    match frame.image_source() {
        Some(ImageSource::Inline(data)) => Ok(STANDARD.decode(data.trim())?),
        Some(ImageSource::Path(path)) => {
            tokio::fs::read(path)
                .await
                .map_err(|source| VisionError::ImageRead {
                    path: path.to_path_buf(),
                    source,
                })
        }
        None => Err(VisionError::validation(frame_id, "no image data or path provided")),
    }
}

/// Pull quoted on-screen text out of a caption (`"VWAP 451.20"`).
fn extract_ocr_text(caption: &str) -> String {
    caption
        .split('"')
        .skip(1)
        .step_by(2)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
