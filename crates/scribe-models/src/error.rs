//! Model decoding errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unrecognized input shape: expected one of {tried}")]
    UnrecognizedInputShape { tried: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
