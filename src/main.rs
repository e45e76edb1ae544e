use std::path::PathBuf;
use std::sync::Arc;

use live_commentary::api::{run_server, AppState};
use live_commentary::{AppConfig, CommentaryEngine};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    // Setup Logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🎙️ Starting live commentary...");

    // Load Configuration
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let mut config = AppConfig::load(&config_path)?;
    config.apply_env();
    if let Some(asset) = std::env::args().nth(1) {
        config.asset = Some(asset);
    }
    info!("⚙️ Loaded configuration from {} (persona: {})", config_path, config.persona.name);

    let Some(asset) = config.watched_asset().map(str::to_string) else {
        error!("❌ No asset to watch: pass it as the first argument or set WATCH_ASSET");
        std::process::exit(1);
    };

    let bind = config.server.bind.clone();
    let audio_dir = PathBuf::from(&config.server.audio_dir);
    tokio::fs::create_dir_all(&audio_dir).await?;

    let engine = CommentaryEngine::from_config(config);
    if let Err(e) = engine.start(&asset).await {
        error!("❌ Failed to go live on {}: {}", asset, e);
        std::process::exit(1);
    }

    let state = Arc::new(AppState { engine, audio_dir });
    run_server(state, &bind).await?;

    Ok(())
}
