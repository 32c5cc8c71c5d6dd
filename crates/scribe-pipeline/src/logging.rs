//! Structured run logging.
//!
//! A run gets one id. Each stage of the run (captioning, processing) logs
//! through its own [`RunLogger`] sharing that id and carrying its own clock,
//! so completion lines report how long the stage took.

use std::time::Instant;

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Logger for one stage of a pipeline run.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    stage: String,
    started: Instant,
}

impl RunLogger {
    /// Logger for the whole run, with a fresh run id.
    pub fn new(stage: &str) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            stage: stage.to_string(),
            started: Instant::now(),
        }
    }

    /// Logger for a sub-stage of the same run. Its clock starts now.
    pub fn stage(&self, stage: &str) -> Self {
        Self {
            run_id: self.run_id.clone(),
            stage: stage.to_string(),
            started: Instant::now(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            stage = %self.stage,
            "{} started: {}", self.stage, message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            stage = %self.stage,
            elapsed_ms = self.elapsed_ms(),
            "{}: {}", self.stage, message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            stage = %self.stage,
            elapsed_ms = self.elapsed_ms(),
            "{} failed: {}", self.stage, message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            stage = %self.stage,
            elapsed_ms = self.elapsed_ms(),
            "{} finished: {}", self.stage, message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn stage_name(&self) -> &str {
        &self.stage
    }

    /// Milliseconds since this stage logger was created.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Span carrying the run id and stage.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            stage = %self.stage
        )
    }
}

/// Install the global subscriber: JSON when `LOG_FORMAT=json`, otherwise
/// coloured text. Logs go to stderr; stdout carries the output document.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("scribe_pipeline=info,scribe_vision=info"));

    let layer = fmt::layer().with_writer(std::io::stderr);
    if use_json {
        tracing_subscriber::registry()
            .with(layer.json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(layer.with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}
