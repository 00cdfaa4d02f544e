use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use meeting_recorder::{
    create_router, AppState, Config, FileCaptureDevice, FsBlobStore, MemoryMetadataStore,
    MetadataStore, NatsMetadataStore, SessionController,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "meeting-recorder", about = "Segmented meeting recording service")]
struct Args {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/meeting-recorder")]
    config: String,

    /// WAV file replayed as the live capture source
    #[arg(long)]
    input: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Loaded config: {}", cfg.service.name);
    info!("Blob root: {}", cfg.storage.blob_root);

    let metadata: Arc<dyn MetadataStore> = match &cfg.nats.url {
        Some(url) => Arc::new(NatsMetadataStore::connect(url).await?),
        None => {
            warn!("No NATS url configured, metadata is kept in memory only");
            Arc::new(MemoryMetadataStore::new())
        }
    };

    let controller = SessionController::new(
        cfg.recorder_config()?,
        Arc::new(FileCaptureDevice::new(args.input)),
        Arc::new(FsBlobStore::new(&cfg.storage.blob_root)),
        metadata,
    );

    let app = create_router(AppState::new(controller.clone()));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(controller))
        .await
        .context("HTTP server failed")?;

    Ok(())
}

/// On Ctrl-C, finish any active session before the server exits
async fn shutdown_signal(controller: SessionController) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }

    info!("Shutting down");
    match controller.stop().await {
        Ok(report) => info!(
            "Finalized session {} before exit ({:?})",
            report.session_id, report.state
        ),
        Err(e) => info!("No session to finalize: {}", e),
    }
}
