//! End-to-end caption pipeline for one analysis document.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use scribe_models::{AnalysisDocument, AnalysisOutput, CaptionsOutput, ProcessedCaptionSet};
use scribe_vision::{ModelCache, VisionClient};

use crate::captioning::Captioner;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::RunLogger;
use crate::processor::CaptionProcessor;
use crate::recovery::{plan_caption_fallback, Diagnostics, ErrorRecord, CAPTION_OPERATION};

/// Result of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub output: AnalysisOutput,
    /// Present when anything went wrong, including non-fatal notes
    pub diagnostics: Option<Diagnostics>,
    /// Operator-facing warning: one line, or the full report in verbose mode
    pub warning: Option<String>,
}

pub struct CaptionPipeline {
    config: PipelineConfig,
    processor: CaptionProcessor,
    model_cache: Arc<ModelCache>,
}

impl CaptionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let processor = CaptionProcessor::new(config.processor.clone(), config.selector.clone());
        Self {
            config,
            processor,
            model_cache: Arc::new(ModelCache::new()),
        }
    }

    /// Share a model-availability cache across pipelines.
    pub fn with_model_cache(mut self, model_cache: Arc<ModelCache>) -> Self {
        self.model_cache = model_cache;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn processor(&self) -> &CaptionProcessor {
        &self.processor
    }

    async fn caption(
        &self,
        document: &AnalysisDocument,
        record: &mut ErrorRecord,
        cancel: &CancellationToken,
        logger: &RunLogger,
    ) -> PipelineResult<ProcessedCaptionSet> {
        let mut problems = self.config.validate().into_iter();
        if let Some(first) = problems.next() {
            record.record(first.clone());
            problems.for_each(|p| record.note(p));
            return Err(first);
        }

        let client = VisionClient::new(self.config.vision.clone())
            .map_err(PipelineError::from)
            .map_err(|e| {
                record.record(e.clone());
                e
            })?
            .with_model_cache(Arc::clone(&self.model_cache));

        let transcript = (!document.transcript.is_empty()).then_some(&document.transcript);
        let captioning = logger.stage("captioning");
        captioning.log_start(&format!(
            "model {}, two-pass: {}",
            self.config.caption_model, self.config.two_pass
        ));
        let raw = Captioner::new(client, self.config.clone())
            .generate(
                &document.frames.source_file,
                &document.frames.frames,
                transcript,
                record,
                cancel,
            )
            .await
            .map_err(|e| {
                captioning.log_error(&e.to_string());
                e
            })?;
        captioning.log_completion(&format!(
            "{} of {} frames captioned",
            raw.frames.len(),
            raw.total_frames
        ));

        let processing = logger.stage("processing");
        processing.log_start(&format!("{} captions", raw.frames.len()));
        let processed = self.processor.process(&raw, transcript);
        processing.log_completion(&format!(
            "{} captions, {} key frames, {} tokens",
            processed.processed_count,
            processed.key_frames.len(),
            processed.estimated_tokens
        ));
        if !processed.token_budget_met {
            record.note(PipelineError::TokenBudgetExceeded {
                component: "Key frames".to_string(),
                tokens: processed.estimated_tokens,
                budget: self.config.processor.token_budget,
            });
        }
        Ok(processed)
    }

    /// Caption, process and select key frames for `document`.
    ///
    /// Never fails: a captioning failure degrades the output to transcript or
    /// frame metadata and is described in the report.
    pub async fn run_analysis(
        &self,
        document: AnalysisDocument,
        cancel: &CancellationToken,
    ) -> AnalysisReport {
        let logger = RunLogger::new("caption_pipeline");
        let span = logger.create_span();
        self.run_with_logger(document, cancel, &logger)
            .instrument(span)
            .await
    }

    async fn run_with_logger(
        &self,
        document: AnalysisDocument,
        cancel: &CancellationToken,
        logger: &RunLogger,
    ) -> AnalysisReport {
        logger.log_start(&format!(
            "{} frames, transcript: {}",
            document.frames.len(),
            if document.transcript.is_empty() { "no" } else { "yes" }
        ));

        if document.frames.is_empty() {
            let empty = CaptionsOutput {
                source_file: document.frames.source_file.clone(),
                ..Default::default()
            };
            let captions = self.processor.process(&empty, None);
            logger.log_completion("no frames to caption");
            let mut output = AnalysisOutput::without_captions(document);
            output.captions = Some(captions);
            return AnalysisReport {
                output,
                diagnostics: None,
                warning: None,
            };
        }

        let has_transcript = !document.transcript.is_empty();
        let mut record = ErrorRecord::new(CAPTION_OPERATION);
        let result = self.caption(&document, &mut record, cancel, logger).await;
        let mut output = AnalysisOutput::without_captions(document);

        let warning = match result {
            Ok(processed) => {
                logger.log_completion(&format!(
                    "{} key frames from {} captions",
                    processed.key_frames.len(),
                    processed.processed_count
                ));
                output.captions = Some(processed);
                let degraded = record.errors().iter().find(|e| {
                    matches!(
                        e,
                        PipelineError::TokenBudgetExceeded { .. }
                            | PipelineError::ProcessingTimeout { .. }
                    )
                });
                if let Some(e) = degraded {
                    logger.log_warning(&e.to_string());
                }
                degraded.map(|e| format!("Warning: {}", e))
            }
            Err(error) => {
                let plan = plan_caption_fallback(&error, has_transcript);
                logger.log_warning(&plan.message);
                output.caption_fallback = Some(plan.to_caption_fallback());
                Some(if self.config.verbose {
                    record.diagnostic_message()
                } else {
                    format!("Warning: {}", plan.message)
                })
            }
        };

        AnalysisReport {
            output,
            diagnostics: (!record.is_empty()).then(|| record.diagnostics()),
            warning,
        }
    }
}
