use scribe_pipeline::PipelineConfig;
use scribe_vision::VisionClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = PipelineConfig::from_env();

    println!(
        "scribe-selfcheck: starting with vision_url={}",
        config.vision.base_url
    );
    ensure_config_valid(&config)?;

    let client = VisionClient::new(config.vision.clone())?;
    let models = client
        .list_models()
        .await
        .map_err(|e| anyhow::anyhow!("vision service not reachable: {}", e))?;
    println!("scribe-selfcheck: {} models installed", models.len());

    ensure_model(&client, &config.caption_model).await?;
    if config.two_pass {
        ensure_model(&client, &config.rich_model).await?;
    }

    println!("scribe-selfcheck: ok");
    Ok(())
}

fn ensure_config_valid(config: &PipelineConfig) -> anyhow::Result<()> {
    let problems = config.validate();
    if let Some(first) = problems.first() {
        for problem in &problems {
            eprintln!("scribe-selfcheck: {}", problem);
        }
        return Err(anyhow::anyhow!("invalid configuration: {}", first));
    }
    Ok(())
}

async fn ensure_model(client: &VisionClient, model: &str) -> anyhow::Result<()> {
    client
        .ensure_model_available(model)
        .await
        .map_err(|e| anyhow::anyhow!("{} (try: ollama pull {})", e, model))
}
