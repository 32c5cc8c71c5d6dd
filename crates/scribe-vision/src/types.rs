//! Inference service request/response types.

use serde::{Deserialize, Serialize};

/// Prompt used when the configuration does not supply one.
pub const DEFAULT_CAPTION_PROMPT: &str = "Describe this trading chart image. Focus on any visible \
indicators, price levels, candlestick patterns, and text visible on the screen. Be concise but \
include specific details like numbers, indicator names, and chart patterns.";

/// Context window requested for every generate call.
pub const DEFAULT_NUM_CTX: u32 = 4096;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Request body for `POST /api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    /// Base64-encoded images
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    pub stream: bool,
    pub options: GenerateOptions,
}

impl GenerateRequest {
    /// Non-streaming request with the default sampling options.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            images,
            stream: false,
            options: GenerateOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub num_ctx: u32,
    pub temperature: f64,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            num_ctx: DEFAULT_NUM_CTX,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Response body from `POST /api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub model: String,
    pub response: String,
    #[serde(default)]
    pub done: bool,
    /// Nanoseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
}

/// Response body from `GET /api/tags`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

impl TagsResponse {
    /// Model names in registry order.
    pub fn names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}
