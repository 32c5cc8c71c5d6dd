//! End-to-end pipeline tests against a mocked inference service.

use std::time::Duration;

use scribe_models::{
    AnalysisDocument, CaptionPass, CaptionsOutput, FallbackStrategy, Frame, FrameCaption,
    FrameList, Transcript, TranscriptSegment,
};
use scribe_pipeline::{
    CaptionPipeline, CaptionProcessor, ErrorKind, PipelineConfig, ProcessorConfig,
    SelectorConfig,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FAST_MODEL: &str = "moondream:1.8b";
const RICH_MODEL: &str = "qwen2.5vl:7b";

fn config_for(base_url: &str) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.vision.base_url = base_url.to_string();
    config.vision.base_delay = Duration::from_millis(5);
    config.vision.max_delay = Duration::from_millis(20);
    config
}

async fn mount_tags(server: &MockServer, names: &[&str]) {
    let models: Vec<_> = names.iter().map(|n| json!({ "name": n })).collect();
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": models })))
        .mount(server)
        .await;
}

fn generate_ok(model: &str, text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": model,
        "response": text,
        "done": true
    }))
}

fn frame_list(frames: Vec<Frame>) -> FrameList {
    let mut list = FrameList::from_frames(frames);
    list.source_file = "session.mp4".to_string();
    list
}

fn document(frames: Vec<Frame>, transcript: Transcript) -> AnalysisDocument {
    AnalysisDocument {
        transcript,
        frames: frame_list(frames),
        ..Default::default()
    }
}

fn timeline_frames(count: u32, step: f64) -> Vec<Frame> {
    (0..count)
        .map(|i| Frame::inline(i, f64::from(i) * step, "aGVsbG8="))
        .collect()
}

fn keyword_transcript() -> Transcript {
    Transcript::from_segments(vec![
        TranscriptSegment::new(0, 0.0, 899.0, "Welcome back to the session"),
        TranscriptSegment::new(1, 899.0, 905.0, "Watch the VWAP reclaim right here"),
        TranscriptSegment::new(2, 905.0, 1800.0, "That wraps it up for today"),
    ])
}

#[tokio::test]
async fn test_long_session_selects_key_frames() {
    let server = MockServer::start().await;
    mount_tags(&server, &[FAST_MODEL]).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_ok(FAST_MODEL, "Candlestick chart with the wap near 451.20"))
        .mount(&server)
        .await;

    // 60 frames every 30s plus 8 near-duplicates one second later
    let mut frames = timeline_frames(60, 30.0);
    for i in 1..=8u32 {
        frames.push(Frame::inline(100 + i, f64::from(i) * 30.0 + 1.0, "aGVsbG8="));
    }

    let pipeline = CaptionPipeline::new(config_for(&server.uri()));
    let report = pipeline
        .run_analysis(document(frames, keyword_transcript()), &CancellationToken::new())
        .await;

    assert!(report.warning.is_none());
    assert!(report.output.caption_fallback.is_none());
    let captions = report.output.captions.expect("captions present");

    assert_eq!(captions.total_frames, 68);
    assert_eq!(captions.processed_count, 60);
    assert_eq!(captions.processing_stats.duplicates_removed, 8);
    assert!(captions.key_frames.len() <= 12);
    assert!(captions
        .key_frames
        .iter()
        .any(|c| (c.timestamp - 900.0).abs() <= 3.0));
    assert!(captions
        .key_frames
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(captions.key_frames[0].caption.contains("VWAP"));
    assert!(captions.estimated_tokens <= 4000);
}

#[tokio::test]
async fn test_missing_model_falls_back_to_transcript() {
    let server = MockServer::start().await;
    mount_tags(&server, &["A", "B"]).await;

    let pipeline = CaptionPipeline::new(config_for(&server.uri()));
    let report = pipeline
        .run_analysis(
            document(timeline_frames(3, 30.0), keyword_transcript()),
            &CancellationToken::new(),
        )
        .await;

    assert!(report.output.captions.is_none());
    let fallback = report.output.caption_fallback.expect("fallback recorded");
    assert_eq!(fallback.strategy, FallbackStrategy::TranscriptOnly);
    assert_eq!(fallback.error_kind, "ModelNotFound");

    let diagnostics = report.diagnostics.expect("diagnostics");
    // permanent failure: no retries
    assert_eq!(diagnostics.attempt_count, 1);
    assert_eq!(diagnostics.error_kinds, vec![ErrorKind::ModelNotFound]);
    assert!(diagnostics.errors[0].ends_with("(available: A, B)"));
    assert!(diagnostics
        .remedies
        .iter()
        .any(|r| r == "Pull the required model: ollama pull moondream:1.8b"));

    let warning = report.warning.expect("warning");
    assert!(warning.starts_with("Warning: Model moondream:1.8b not installed"));
    assert!(!warning.contains('\n'));
}

#[tokio::test]
async fn test_verbose_mode_prints_full_diagnostics() {
    let server = MockServer::start().await;
    mount_tags(&server, &["A", "B"]).await;

    let mut config = config_for(&server.uri());
    config.verbose = true;
    let report = CaptionPipeline::new(config)
        .run_analysis(
            document(timeline_frames(2, 30.0), Transcript::default()),
            &CancellationToken::new(),
        )
        .await;

    let warning = report.warning.expect("warning");
    assert!(warning.starts_with("Caption Generation failed after 1 attempt\n"));
    assert!(warning.contains("Suggested remedies:"));
    assert!(warning.contains("Fallback options:"));
    assert_eq!(
        report.output.caption_fallback.map(|f| f.strategy),
        Some(FallbackStrategy::FrameMetadataOnly)
    );
}

#[tokio::test]
async fn test_unreachable_service_retries_then_degrades() {
    let mut config = config_for("http://127.0.0.1:9");
    config.availability_attempts = 2;
    config.vision.request_timeout = Duration::from_secs(2);

    let report = CaptionPipeline::new(config)
        .run_analysis(
            document(timeline_frames(2, 30.0), Transcript::default()),
            &CancellationToken::new(),
        )
        .await;

    let diagnostics = report.diagnostics.expect("diagnostics");
    assert_eq!(diagnostics.attempt_count, 2);
    assert!(!diagnostics.recoverable);
    assert!(diagnostics
        .error_kinds
        .iter()
        .all(|k| *k == ErrorKind::ServiceUnavailable));
    assert_eq!(
        report.output.caption_fallback.map(|f| f.strategy),
        Some(FallbackStrategy::FrameMetadataOnly)
    );
}

#[tokio::test]
async fn test_invalid_config_degrades_without_network() {
    let mut config = config_for("http://127.0.0.1:9");
    config.workers = 0;
    config.caption_model = String::new();

    let report = CaptionPipeline::new(config)
        .run_analysis(
            document(timeline_frames(2, 30.0), keyword_transcript()),
            &CancellationToken::new(),
        )
        .await;

    let fallback = report.output.caption_fallback.expect("fallback recorded");
    assert_eq!(fallback.error_kind, "ValidationFailure");
    assert_eq!(fallback.strategy, FallbackStrategy::TranscriptOnly);

    let diagnostics = report.diagnostics.expect("diagnostics");
    assert_eq!(diagnostics.errors.len(), 2);
    assert_eq!(diagnostics.attempt_count, 1);
}

#[tokio::test]
async fn test_caption_deadline_degrades_to_timeout() {
    let server = MockServer::start().await;
    mount_tags(&server, &[FAST_MODEL]).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_ok(FAST_MODEL, "Chart").set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let mut config = config_for(&server.uri());
    config.caption_timeout = Duration::from_millis(200);

    let report = CaptionPipeline::new(config)
        .run_analysis(
            document(timeline_frames(4, 30.0), keyword_transcript()),
            &CancellationToken::new(),
        )
        .await;

    let fallback = report.output.caption_fallback.expect("fallback recorded");
    assert_eq!(fallback.error_kind, "ProcessingTimeout");
    assert_eq!(fallback.message, "Caption generation timed out, continuing with transcript-only analysis");
}

#[tokio::test]
async fn test_caption_deadline_keeps_finished_frames() {
    let server = MockServer::start().await;
    mount_tags(&server, &[FAST_MODEL]).await;
    // One frame's image stalls past the deadline; the rest answer at once
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("c2xvdw=="))
        .respond_with(generate_ok(FAST_MODEL, "Chart").set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_ok(FAST_MODEL, "Candlestick chart near the VWAP"))
        .mount(&server)
        .await;

    let mut frames = timeline_frames(3, 30.0);
    frames.push(Frame::inline(3, 90.0, "c2xvdw=="));

    let mut config = config_for(&server.uri());
    config.caption_timeout = Duration::from_millis(1500);

    let report = CaptionPipeline::new(config)
        .run_analysis(document(frames, keyword_transcript()), &CancellationToken::new())
        .await;

    assert!(report.output.caption_fallback.is_none());
    let captions = report.output.captions.expect("captions present");
    assert_eq!(captions.total_frames, 4);
    assert_eq!(captions.processed_count, 3);
    assert!(captions.captions.iter().all(|c| c.frame != "frame_0003.jpg"));

    let diagnostics = report.diagnostics.expect("deadline noted");
    assert!(diagnostics.error_kinds.contains(&ErrorKind::ProcessingTimeout));
    let warning = report.warning.expect("warning");
    assert!(warning.starts_with("Warning: Caption generation timed out"));
}

#[tokio::test]
async fn test_zero_frames_yield_empty_selection() {
    let pipeline = CaptionPipeline::new(config_for("http://127.0.0.1:9"));
    let report = pipeline
        .run_analysis(document(vec![], keyword_transcript()), &CancellationToken::new())
        .await;

    assert!(report.warning.is_none());
    assert!(report.diagnostics.is_none());
    let captions = report.output.captions.expect("empty caption set");
    assert!(captions.key_frames.is_empty());
    assert_eq!(captions.total_frames, 0);
}

#[tokio::test]
async fn test_two_pass_rich_captions_supersede_fast() {
    let server = MockServer::start().await;
    mount_tags(&server, &[FAST_MODEL, RICH_MODEL]).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "model": RICH_MODEL })))
        .respond_with(generate_ok(
            RICH_MODEL,
            "Detailed candlestick chart with EMA and VWAP lines and rising volume",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_ok(FAST_MODEL, "Chart on screen"))
        .mount(&server)
        .await;

    let mut config = config_for(&server.uri());
    config.two_pass = true;
    config.processor.max_key_frames = 5;

    let report = CaptionPipeline::new(config)
        .run_analysis(
            document(timeline_frames(20, 30.0), Transcript::default()),
            &CancellationToken::new(),
        )
        .await;

    assert!(report.diagnostics.is_none());
    let captions = report.output.captions.expect("captions present");
    assert_eq!(captions.processed_count, 20);
    assert_eq!(captions.rich_pass.as_ref().map(Vec::len), Some(5));
    assert_eq!(captions.fast_pass.as_ref().map(Vec::len), Some(15));
    assert!(captions
        .captions
        .iter()
        .filter(|c| c.pass == CaptionPass::Rich)
        .all(|c| c.model == RICH_MODEL));
}

#[tokio::test]
async fn test_missing_rich_model_keeps_fast_captions() {
    let server = MockServer::start().await;
    mount_tags(&server, &[FAST_MODEL]).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_ok(FAST_MODEL, "Chart on screen"))
        .mount(&server)
        .await;

    let mut config = config_for(&server.uri());
    config.two_pass = true;

    let report = CaptionPipeline::new(config)
        .run_analysis(
            document(timeline_frames(6, 30.0), Transcript::default()),
            &CancellationToken::new(),
        )
        .await;

    assert!(report.output.caption_fallback.is_none());
    let captions = report.output.captions.expect("captions present");
    assert_eq!(captions.processed_count, 6);
    assert!(captions.rich_pass.is_none());
    let diagnostics = report.diagnostics.expect("rich pass noted");
    assert_eq!(diagnostics.attempt_count, 0);
    assert_eq!(diagnostics.error_kinds, vec![ErrorKind::ModelNotFound]);
}

fn raw_batch(count: u32, text: &str) -> CaptionsOutput {
    let frames: Vec<FrameCaption> = (0..count)
        .map(|i| {
            FrameCaption::new(
                scribe_models::frame_caption_id(i),
                f64::from(i) * 15.0,
                text,
                FAST_MODEL,
                0.6 + f64::from(i % 5) * 0.05,
                CaptionPass::Fast,
            )
        })
        .collect();
    CaptionsOutput {
        source_file: "session.mp4".to_string(),
        total_frames: frames.len(),
        frames,
        ..Default::default()
    }
}

#[test]
fn test_processing_is_deterministic() {
    let processor = CaptionProcessor::new(ProcessorConfig::default(), SelectorConfig::default());
    let raw = raw_batch(80, "Price chart with VWAP and RSI 61 near resistance");
    let transcript = keyword_transcript();

    let first = processor.process(&raw, Some(&transcript));
    let second = processor.process(&raw, Some(&transcript));
    assert_eq!(first.key_frames, second.key_frames);
    assert_eq!(first.key_frames.len(), 12);
    for (i, a) in first.key_frames.iter().enumerate() {
        for b in &first.key_frames[i + 1..] {
            assert!((a.timestamp - b.timestamp).abs() >= 2.0);
        }
    }
}

#[test]
fn test_token_budget_is_respected() {
    let config = ProcessorConfig {
        token_budget: 30,
        ..Default::default()
    };
    let processor = CaptionProcessor::new(config, SelectorConfig::default());
    let raw = raw_batch(
        10,
        "Price consolidating under the prior day high while volume builds into the close of the session",
    );

    let set = processor.process(&raw, None);
    assert!(set.token_optimized);
    assert!(set.token_budget_met);
    assert!(set.estimated_tokens <= 30);
    assert!(!set.key_frames.is_empty());
}
