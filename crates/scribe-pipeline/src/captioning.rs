//! Captioning stage: availability check, fast pass and optional rich pass.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scribe_models::{CaptionsOutput, Frame, FrameCaption, Transcript};
use scribe_vision::{cancellable_sleep, CaptionBatch, RetryConfig, VisionClient};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::processor::CaptionProcessor;
use crate::recovery::ErrorRecord;

/// Replace fast captions with rich captions of the same frame.
pub fn merge_rich_captions(fast: Vec<FrameCaption>, rich: Vec<FrameCaption>) -> Vec<FrameCaption> {
    let mut by_frame: HashMap<String, FrameCaption> =
        rich.into_iter().map(|c| (c.frame.clone(), c)).collect();
    fast.into_iter()
        .map(|caption| by_frame.remove(&caption.frame).unwrap_or(caption))
        .collect()
}

/// Drives the vision client for one analysis run.
pub struct Captioner {
    client: VisionClient,
    config: PipelineConfig,
    processor: CaptionProcessor,
}

impl Captioner {
    pub fn new(client: VisionClient, config: PipelineConfig) -> Self {
        let processor = CaptionProcessor::new(config.processor.clone(), config.selector.clone());
        Self {
            client,
            config,
            processor,
        }
    }

    fn fail(record: &mut ErrorRecord, error: PipelineError) -> PipelineError {
        record.record(error.clone());
        error
    }

    /// Check the fast model, retrying transient failures with backoff.
    async fn await_model(
        &self,
        record: &mut ErrorRecord,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let model = &self.config.caption_model;
        let limit = self.config.availability_timeout;
        let backoff = RetryConfig::new("availability check")
            .with_base_delay(self.config.vision.base_delay)
            .with_max_delay(self.config.vision.max_delay);

        loop {
            let error = match timeout(limit, self.client.ensure_model_available(model)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => PipelineError::from(e),
                Err(_) => PipelineError::timeout("Model availability check", limit.as_secs()),
            };

            warn!(
                model = %model,
                attempt = record.attempt_count() + 1,
                error = %error,
                "Model availability check failed"
            );
            record.record(error.clone());
            if !record.should_retry(self.config.availability_attempts) {
                return Err(error);
            }

            let delay = backoff.delay_for_attempt(record.attempt_count().saturating_sub(1));
            if cancellable_sleep(delay, cancel).await.is_err() {
                return Err(Self::fail(
                    record,
                    PipelineError::timeout("Model availability check", limit.as_secs()),
                ));
            }
        }
    }

    /// Run one captioning pass against `deadline`.
    ///
    /// When the deadline passes the pass is cancelled and drained, so frames
    /// that finished in time are kept. The flag reports whether that happened.
    async fn run_pass(
        &self,
        frames: &[Frame],
        model: &str,
        workers: usize,
        deadline: tokio::time::Instant,
        cancel: &CancellationToken,
    ) -> PipelineResult<(CaptionBatch, bool)> {
        let pass = self.client.caption_frames(frames, model, workers, cancel);
        tokio::pin!(pass);

        let mut timed_out = false;
        let batch = tokio::select! {
            batch = &mut pass => batch,
            _ = tokio::time::sleep_until(deadline) => {
                timed_out = true;
                cancel.cancel();
                pass.await
            }
        };
        let batch = batch?;

        if !timed_out {
            return Ok((batch.into_result()?, false));
        }

        warn!(
            model = %model,
            captioned = batch.captions.len(),
            unfinished = batch.failures.len() + batch.skipped,
            "Caption deadline reached"
        );
        if batch.captions.is_empty() {
            return Err(self.deadline_error());
        }
        Ok((batch, true))
    }

    fn deadline_error(&self) -> PipelineError {
        PipelineError::timeout("Caption generation", self.config.caption_timeout.as_secs())
    }

    /// Caption every frame with the fast model, then optionally re-caption
    /// the selected key frames with the rich model.
    ///
    /// Any failure is recorded in `record`. Rich-pass problems are noted and
    /// the fast captions kept.
    pub async fn generate(
        &self,
        source_file: &str,
        frames: &[Frame],
        transcript: Option<&Transcript>,
        record: &mut ErrorRecord,
        cancel: &CancellationToken,
    ) -> PipelineResult<CaptionsOutput> {
        let start = Instant::now();
        let run_cancel = cancel.child_token();

        self.await_model(record, &run_cancel).await?;

        let deadline = tokio::time::Instant::now() + self.config.caption_timeout;
        let (fast, timed_out) = self
            .run_pass(
                frames,
                &self.config.caption_model,
                self.config.workers,
                deadline,
                &run_cancel,
            )
            .await
            .map_err(|e| Self::fail(record, e))?;

        if timed_out {
            record.note(self.deadline_error());
        }

        if !fast.failures.is_empty() {
            warn!(
                failed = fast.failures.len(),
                captioned = fast.captions.len(),
                "Some frames could not be captioned"
            );
        }

        let mut models = vec![self.config.caption_model.clone()];
        let mut captions = fast.captions;

        if self.config.two_pass
            && !timed_out
            && self.config.rich_model != self.config.caption_model
        {
            match self
                .rich_pass(frames, &captions, transcript, deadline, &run_cancel, record)
                .await
            {
                Ok(rich) if !rich.is_empty() => {
                    info!(
                        model = %self.config.rich_model,
                        elevated = rich.len(),
                        "Rich captions replace fast captions for key frames"
                    );
                    captions = merge_rich_captions(captions, rich);
                    models.push(self.config.rich_model.clone());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        model = %self.config.rich_model,
                        error = %e,
                        "Rich pass failed, keeping fast captions"
                    );
                    record.note(e);
                }
            }
        }

        Ok(CaptionsOutput {
            source_file: source_file.to_string(),
            processed_at: chrono::Utc::now().timestamp(),
            total_frames: frames.len(),
            processed_time_secs: start.elapsed().as_secs_f64(),
            models,
            frames: captions,
        })
    }

    async fn rich_pass(
        &self,
        frames: &[Frame],
        fast: &[FrameCaption],
        transcript: Option<&Transcript>,
        deadline: tokio::time::Instant,
        cancel: &CancellationToken,
        record: &mut ErrorRecord,
    ) -> PipelineResult<Vec<FrameCaption>> {
        let model = &self.config.rich_model;
        match timeout(
            self.config.availability_timeout,
            self.client.ensure_model_available(model),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(PipelineError::timeout(
                    "Model availability check",
                    self.config.availability_timeout.as_secs(),
                ))
            }
        }

        let key_frames = self.processor.select_key_frames(fast, transcript);
        let key_ids: HashSet<&str> = key_frames.iter().map(|c| c.frame.as_str()).collect();
        let selected: Vec<Frame> = frames
            .iter()
            .filter(|f| key_ids.contains(f.caption_id().as_str()))
            .cloned()
            .collect();

        info!(
            model = %model,
            frames = selected.len(),
            "Re-captioning key frames"
        );

        let workers = (self.config.workers / 2).max(1);
        let (batch, timed_out) = self
            .run_pass(&selected, model, workers, deadline, cancel)
            .await?;
        if timed_out {
            record.note(self.deadline_error());
        }
        Ok(batch.captions)
    }
}
