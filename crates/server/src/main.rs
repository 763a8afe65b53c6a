use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipeserve_core::{
    load_config, validate_config, FfmpegEngine, MediaEngine, PipelineManager, PluginRegistry,
    StreamingSessionManager, TemplateRegistry, WebSocketConnector,
};
use pipeserve_server::api::create_router;
use pipeserve_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long shutdown waits for engines to acknowledge stop
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("PIPESERVE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        "pipeserve {} starting (config {})",
        VERSION,
        &config_hash[..16]
    );

    let ignore_init_errors = config.manager.ignore_init_errors;

    // Engines
    let ffmpeg = Arc::new(FfmpegEngine::new(config.engine.clone()));
    if let Err(e) = ffmpeg.validate().await {
        if !ignore_init_errors {
            return Err(e).context("FFmpeg engine unavailable");
        }
        warn!("FFmpeg engine unavailable: {}", e);
    }
    let engines: Vec<Arc<dyn MediaEngine>> = vec![ffmpeg];
    let engine_types: Vec<&str> = engines.iter().map(|e| e.name()).collect();

    // Templates
    let templates = match TemplateRegistry::load(&config.manager.pipeline_dir, &engine_types) {
        Ok(report) => report.registry,
        Err(e) if ignore_init_errors => {
            warn!("Continuing without templates: {}", e);
            TemplateRegistry::new()
        }
        Err(e) => return Err(e).context("Failed to load pipeline templates"),
    };

    // Streaming sessions need an engine able to build stream pipelines
    let streaming = if config.streaming.enabled {
        match engines.iter().find_map(|e| e.stream_pipeline_factory()) {
            Some(factory) => {
                info!(
                    "Streaming enabled via signaling server {}",
                    config.streaming.signaling_server
                );
                Some(Arc::new(StreamingSessionManager::new(
                    config.streaming.clone(),
                    Arc::new(WebSocketConnector),
                    factory,
                )))
            }
            None => {
                warn!("Streaming enabled but no engine provides stream pipelines; disabled");
                None
            }
        }
    } else {
        info!("Streaming disabled in config");
        None
    };

    let manager = PipelineManager::new(
        config.manager.clone(),
        Arc::new(templates),
        engines,
        Arc::new(PluginRegistry::with_builtins()),
        streaming,
    );

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&manager)));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    manager.shutdown(SHUTDOWN_GRACE).await;
    info!("Pipeline manager stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
