//! Caption pipeline driver.
//!
//! Usage: `scribe-captions [INPUT.json] [TRANSCRIPT.json]`. Input is read
//! from stdin when no path is given. The output document goes to stdout;
//! logs and warnings go to stderr.

use std::io::Read;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use scribe_models::{InputDocument, Transcript};
use scribe_pipeline::{init_tracing, CaptionPipeline, PipelineConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let input = match read_input(args.first().map(String::as_str)) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read input: {}", e);
            std::process::exit(1);
        }
    };

    let document = match InputDocument::from_slice(&input) {
        Ok(doc) => doc,
        Err(e) => {
            error!("Failed to decode input: {}", e);
            std::process::exit(1);
        }
    };
    info!(shape = document.shape(), "Decoded input document");
    let mut analysis = document.into_analysis();

    if let Some(path) = args.get(1) {
        let transcript = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<Transcript>(&bytes).map_err(|e| e.to_string())
            });
        match transcript {
            Ok(transcript) => analysis.transcript = transcript,
            Err(e) => {
                error!("Failed to load transcript {}: {}", path, e);
                std::process::exit(1);
            }
        }
    }

    let config = PipelineConfig::from_env();
    let pipeline = CaptionPipeline::new(config);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            shutdown.cancel();
        }
    });

    let report = pipeline.run_analysis(analysis, &cancel).await;
    if let Some(warning) = &report.warning {
        eprintln!("{}", warning);
    }

    match serde_json::to_string_pretty(&report.output) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to encode output: {}", e);
            std::process::exit(1);
        }
    }
}

fn read_input(path: Option<&str>) -> std::io::Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}
