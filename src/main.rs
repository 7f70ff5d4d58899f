//! File Transfer Server
//!
//! Accepts uploads over HTTP, moves them through the message channel in
//! chunks, and serves the reassembled files back from S3-compatible storage.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_transfer_server::channel::{LocalChannel, MessageChannel};
use file_transfer_server::config::{Config, StorageProvider};
use file_transfer_server::routes::build_router;
use file_transfer_server::state::AppState;
use file_transfer_server::storage::{BlobStore, MemoryStore, S3Client};
use file_transfer_server::transfer::spawn_reassembly_worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_transfer_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting File Transfer Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Chunk size: {} bytes, upload topic: {}",
        config.transfer.chunk_size,
        config.transfer.upload_topic
    );

    let store: Arc<dyn BlobStore> = match config.storage.provider {
        StorageProvider::S3 => {
            tracing::info!("S3 endpoint: {}", config.storage.endpoint);
            tracing::info!("S3 bucket: {}", config.storage.bucket);
            Arc::new(
                S3Client::new(&config.storage)
                    .await
                    .context("Failed to initialize S3 client")?,
            )
        }
        StorageProvider::Memory => {
            tracing::warn!("Using in-memory storage, files are lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    let channel = LocalChannel::with_capacity(config.transfer.channel_capacity);
    let shared_channel: Arc<dyn MessageChannel> = Arc::new(channel.clone());

    // Create application state
    let app_state = AppState::new(config, store, shared_channel);
    let config = app_state.config();

    // Receiving side
    let worker = spawn_reassembly_worker(
        app_state.channel().clone(),
        app_state.engine().clone(),
        &config.transfer.upload_topic,
    )
    .await
    .context("Failed to subscribe to upload topic")?;
    let eviction = app_state.engine().spawn_eviction_task();

    // Start server with graceful shutdown
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("File Transfer Server listening on {}", addr);

    let app = build_router(app_state.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Let the worker finish chunks already delivered
    channel.close();
    if let Err(e) = worker.await {
        tracing::error!("Reassembly worker panicked: {}", e);
    }
    if let Some(eviction) = eviction {
        eviction.abort();
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
