use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use streamsync::EngineConfig;
use streamsync::core::media::{TracingAudioSink, TracingVideoActuator};
use streamsync::state::EngineState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Handle CLI arguments
    let mut config_path: Option<PathBuf> = None;
    let mut args = env::args();
    let _ = args.next();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                config_path = Some(PathBuf::from(path));
            }
            other => {
                anyhow::bail!("Unknown argument '{other}'. Use --config <file>");
            }
        }
    }

    // Load configuration
    let config = match &config_path {
        Some(path) => EngineConfig::from_file(path),
        None => EngineConfig::from_env(),
    }
    .map_err(|e| anyhow!(e.to_string()))?;

    if !config.has_synthesis_endpoint() {
        anyhow::bail!("No synthesis endpoint configured. Set SYNTHESIS_URL or synthesis.url");
    }

    let state = EngineState::from_config(
        config,
        Arc::new(TracingAudioSink::default()),
        Arc::new(TracingVideoActuator),
    )?;

    let mut pipeline_events = state.coordinator.subscribe();
    tokio::spawn(async move {
        while let Some(event) = pipeline_events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => info!("pipeline event: {json}"),
                Err(e) => error!("Failed to serialize pipeline event: {e}"),
            }
        }
    });

    let mut playback_events = state.controller.subscribe();
    tokio::spawn(async move {
        while let Some(event) = playback_events.recv().await {
            info!("playback event: {:?}", event);
        }
    });

    info!("Reading utterance messages from stdin, one JSON object per line");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match state.dispatcher.dispatch_json(line).await {
            Ok(outcome) => info!("dispatched: {:?}", outcome),
            Err(e) => error!("[{}] {e}", e.kind()),
        }
    }

    info!("Input closed; stopping playback");
    state.coordinator.stop_session().await;
    state.controller.stop().await;
    Ok(())
}
