use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod envelope;
mod errors;
mod handlers;
mod images;
mod models;
mod path_clean;
mod routes;
mod state;
mod storage;
mod thumbnail;
mod upload;

use config::{AppConfig, Args};
use images::BufferPool;
use state::AppState;
use storage::registry::BucketRegistry;
use storage::s3_connection::S3ConnectionManager;
use thumbnail::ThumbnailCache;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = <Args as clap::Parser>::parse();
    let config = Arc::new(AppConfig::load(&args.config)?);
    tracing::info!(port = config.server.port, debug = config.server.debug, "loaded configuration");

    let connections = Arc::new(S3ConnectionManager::new());
    for s3_cfg in &config.s3 {
        connections.add_connection(s3_cfg).await?;
        tracing::info!(name = %s3_cfg.name, endpoint = %s3_cfg.endpoint, "registered S3 connection");
    }

    let registry = Arc::new(BucketRegistry::from_config(&config, connections.clone()).await?);
    tracing::info!(buckets = ?registry.get_bucket_list().await, "registered buckets");

    let thumbnails = Arc::new(ThumbnailCache::new(config.oss.thumbnail_dir.clone()));
    let buffers = Arc::new(BufferPool::new());

    let state = AppState {
        config: config.clone(),
        registry,
        connections,
        thumbnails,
        buffers,
    };

    let app = routes::build(state);

    let addr = config.addr(args.host.as_deref());
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) if err.kind() == ErrorKind::PermissionDenied && args.host.is_none() => {
            let fallback_addr = format!("127.0.0.1:{}", config.server.port);
            tracing::warn!(%addr, %err, fallback = %fallback_addr, "permission denied binding wildcard host, falling back");
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

/// Resolves as soon as a shutdown signal arrives (so `axum::serve` starts
/// draining in-flight requests), and arms a 5-second hard deadline after
/// which the process exits regardless of what's still in flight.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining in-flight requests (5s grace period)");
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        tracing::warn!("grace period elapsed, abandoning remaining in-flight requests");
        std::process::exit(0);
    });
}
