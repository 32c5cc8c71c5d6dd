//! Bounded captioning worker pool.
//!
//! A producer feeds frames into a bounded queue, a fixed number of workers
//! pull from it and call the service, and the collector gathers results as
//! they arrive. All three stop on cancellation.

use std::sync::Arc;

use scribe_models::{Frame, FrameCaption};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::VisionClient;
use crate::error::{VisionError, VisionResult};
use crate::retry::FailureTracker;

/// Worker count used when the caller asks for zero.
pub const DEFAULT_WORKERS: usize = 4;

/// Consecutive frame failures logged before suppression.
const MAX_LOGGED_FAILURES: u32 = 5;

/// A frame that could not be captioned.
#[derive(Debug)]
pub struct FrameFailure {
    pub frame: String,
    pub error: VisionError,
}

/// Result of captioning a set of frames.
#[derive(Debug, Default)]
pub struct CaptionBatch {
    /// Successful captions, chronological
    pub captions: Vec<FrameCaption>,
    /// Failed frames, in input order
    pub failures: Vec<FrameFailure>,
    /// Frames never attempted because the run was cancelled
    pub skipped: usize,
}

impl CaptionBatch {
    pub fn is_empty(&self) -> bool {
        self.captions.is_empty()
    }

    /// Partial results are fine; a batch with no captions at all is an error.
    ///
    /// Returns the first failure's error, or `Cancelled` when nothing ran.
    pub fn into_result(mut self) -> VisionResult<Self> {
        if !self.captions.is_empty() || (self.failures.is_empty() && self.skipped == 0) {
            return Ok(self);
        }
        if self.failures.is_empty() {
            return Err(VisionError::Cancelled);
        }
        Err(self.failures.swap_remove(0).error)
    }
}

type WorkItem = (usize, Frame);
type WorkResult = (usize, String, VisionResult<FrameCaption>);

/// Caption `frames` with `workers` concurrent requests.
pub(crate) async fn caption_with_pool(
    client: &VisionClient,
    frames: Vec<Frame>,
    model: &str,
    workers: usize,
    cancel: &CancellationToken,
) -> CaptionBatch {
    let total = frames.len();
    let workers = match workers {
        0 => DEFAULT_WORKERS,
        n => n,
    }
    .min(total.max(1));

    let (work_tx, work_rx) = mpsc::channel::<WorkItem>(workers * 2);
    let work_rx = Arc::new(Mutex::new(work_rx));
    let (result_tx, mut result_rx) = mpsc::channel::<WorkResult>(total.max(1));

    // Producer
    let producer_cancel = cancel.clone();
    let producer = tokio::spawn(async move {
        for item in frames.into_iter().enumerate() {
            tokio::select! {
                _ = producer_cancel.cancelled() => break,
                sent = work_tx.send(item) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Workers
    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let client = client.clone();
        let model = model.to_string();
        let cancel = cancel.clone();
        let work_rx = Arc::clone(&work_rx);
        let result_tx = result_tx.clone();

        handles.push(tokio::spawn(async move {
            loop {
                let next = {
                    let mut rx = work_rx.lock().await;
                    tokio::select! {
                        _ = cancel.cancelled() => None,
                        item = rx.recv() => item,
                    }
                };
                let Some((order, frame)) = next else {
                    break;
                };

                let frame_id = frame.caption_id();
                let result = client.caption_frame(&frame, &model, &cancel).await;
                if result_tx.send((order, frame_id, result)).await.is_err() {
                    break;
                }
            }
            debug!(worker_id, "Caption worker stopped");
        }));
    }
    drop(result_tx);

    // Collector
    let mut captions = Vec::with_capacity(total);
    let mut failures = Vec::new();
    let mut tracker = FailureTracker::new(MAX_LOGGED_FAILURES);

    while let Some((order, frame, result)) = result_rx.recv().await {
        match result {
            Ok(caption) => {
                tracker.record_success();
                captions.push(caption);
            }
            Err(error) => {
                if tracker.record_failure() {
                    warn!(frame = %frame, error = %error, "Frame captioning failed");
                }
                failures.push((order, FrameFailure { frame, error }));
            }
        }
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Caption worker panicked: {}", e);
        }
    }
    if let Err(e) = producer.await {
        warn!("Caption producer panicked: {}", e);
    }

    captions.sort_by(|a, b| {
        a.timestamp
            .total_cmp(&b.timestamp)
            .then_with(|| a.frame.cmp(&b.frame))
    });
    failures.sort_by_key(|(order, _)| *order);

    let trailing = tracker.failure_count();
    if trailing > MAX_LOGGED_FAILURES {
        warn!(
            trailing,
            "Captioning ended inside a run of consecutive failures"
        );
    }

    let skipped = total - captions.len() - failures.len();
    if skipped > 0 {
        debug!(skipped, "Frames skipped after cancellation");
    }

    CaptionBatch {
        captions,
        failures: failures.into_iter().map(|(_, f)| f).collect(),
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_models::CaptionPass;

    fn failure(frame: &str) -> FrameFailure {
        FrameFailure {
            frame: frame.to_string(),
            error: VisionError::validation(frame, "no image data or path provided"),
        }
    }

    #[test]
    fn test_partial_batch_is_ok() {
        let batch = CaptionBatch {
            captions: vec![FrameCaption::new("frame_0001.jpg", 0.0, "c", "m", 0.7, CaptionPass::Fast)],
            failures: vec![failure("frame_0002.jpg")],
            skipped: 0,
        };
        let batch = batch.into_result().unwrap();
        assert_eq!(batch.failures.len(), 1);
    }

    #[test]
    fn test_total_failure_returns_first_error() {
        let batch = CaptionBatch {
            captions: vec![],
            failures: vec![failure("frame_0001.jpg"), failure("frame_0002.jpg")],
            skipped: 0,
        };
        match batch.into_result() {
            Err(VisionError::Validation { frame, .. }) => assert_eq!(frame, "frame_0001.jpg"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_batch_and_empty_batch() {
        let cancelled = CaptionBatch {
            skipped: 3,
            ..Default::default()
        };
        assert!(matches!(cancelled.into_result(), Err(VisionError::Cancelled)));
        assert!(CaptionBatch::default().into_result().is_ok());
    }
}
