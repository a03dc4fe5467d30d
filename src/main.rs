//! momentography — sync engine and curation API for a photography portfolio.
//!
//! Album folders and YAML manifests live in an object storage bucket next to
//! a bulk EXIF document. A sync pass reconciles them into a local SQLite
//! cache that the HTTP API reads from. Star ratings and likes are curated
//! only in the cache and survive every sync.

#![warn(clippy::all)]

mod cli;
mod config;
mod discovery;
mod http;
mod reconcile;
pub mod retry;
mod shutdown;
mod storage;
mod store;
mod sync;
mod types;
mod views;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::{Config, ExportConfig};
use storage::OssClient;
use store::{GalleryStore, SqliteGalleryStore, MAX_STAR};
use sync::SyncEngine;
use types::SyncStatus;

/// Open the cache and build a sync engine over the configured bucket.
async fn build_engine(config: &Config) -> anyhow::Result<(Arc<SqliteGalleryStore>, SyncEngine)> {
    let store = Arc::new(SqliteGalleryStore::open(&config.db_path).await?);
    tracing::info!(path = %config.db_path.display(), "Opened cache database");
    let objects = Arc::new(OssClient::new(config.oss.clone())?);
    let engine = SyncEngine::new(store.clone(), objects, config.sync.clone());
    Ok((store, engine))
}

/// Run the sync command, once or on an interval until shutdown.
async fn run_sync(config: Config, watch_with_interval: Option<u64>) -> anyhow::Result<()> {
    tracing::debug!(?config, "Resolved configuration");
    let (_, engine) = build_engine(&config).await?;

    let Some(interval) = watch_with_interval else {
        let outcome = engine.run().await;
        if outcome.status == SyncStatus::Error {
            anyhow::bail!("Sync failed: {}", outcome.message);
        }
        return Ok(());
    };

    let shutdown_token = shutdown::install_signal_handler()?;
    loop {
        let outcome = engine.run().await;
        if outcome.status == SyncStatus::Error {
            tracing::warn!("Sync failed, retrying on the next interval");
        }

        if shutdown_token.is_cancelled() {
            tracing::info!("Shutdown requested, exiting...");
            break;
        }
        tracing::info!("Waiting {} seconds...", interval);
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(interval)) => {}
            _ = shutdown_token.cancelled() => {
                tracing::info!("Shutdown during wait, exiting...");
                break;
            }
        }
    }
    Ok(())
}

async fn run_serve(config: Config, bind: std::net::SocketAddr) -> anyhow::Result<()> {
    tracing::debug!(?config, "Resolved configuration");
    let (store, engine) = build_engine(&config).await?;
    let state = http::AppState {
        store,
        sync: engine,
        webhook_secret: config.webhook_secret.as_deref().map(Arc::from),
    };

    let shutdown_token: CancellationToken = shutdown::install_signal_handler()?;
    let listener = tokio::net::TcpListener::bind(bind).await?;
    http::serve(listener, state, shutdown_token).await
}

/// Open an existing cache, or explain how to create one.
async fn open_existing(db_path: &Path) -> anyhow::Result<Option<SqliteGalleryStore>> {
    if !db_path.exists() {
        println!("No cache database found at {}", db_path.display());
        println!("Run a sync first to create the database.");
        return Ok(None);
    }
    Ok(Some(SqliteGalleryStore::open(db_path).await?))
}

async fn run_status(db_path: &Path) -> anyhow::Result<()> {
    let Some(store) = open_existing(db_path).await? else {
        return Ok(());
    };
    let report = views::status_report(&store).await?;

    println!("Cache Database: {}", db_path.display());
    println!();
    println!("Contents:");
    println!("  Albums:       {}", report.summary.albums);
    println!("  Images:       {}", report.summary.images);
    println!("  EXIF records: {}", report.summary.exif_records);
    println!();

    for (label, event) in [
        ("albums", &report.last_albums_update),
        ("exif", &report.last_exif_update),
    ] {
        match event {
            Some(event) => println!(
                "Last {:<6} update: {} [{}] {}",
                label,
                event.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                event.status,
                event.message.as_deref().unwrap_or_default()
            ),
            None => println!("Last {:<6} update: never", label),
        }
    }
    Ok(())
}

async fn run_export(db_path: &Path, export: ExportConfig) -> anyhow::Result<()> {
    let Some(store) = open_existing(db_path).await? else {
        return Ok(());
    };
    views::export_json(&store, &export).await
}

async fn run_star(db_path: &Path, photo_id: &str, star: u8) -> anyhow::Result<()> {
    if star > MAX_STAR {
        anyhow::bail!("Star rating must be between 0 and {}, got {}", MAX_STAR, star);
    }
    let Some(store) = open_existing(db_path).await? else {
        return Ok(());
    };
    if !store.update_image_star(photo_id, star).await? {
        anyhow::bail!("No image with id {}", photo_id);
    }
    println!("{} rated {} stars", photo_id, star);
    Ok(())
}

async fn run_like(db_path: &Path, photo_id: &str, likes: u64) -> anyhow::Result<()> {
    let Some(store) = open_existing(db_path).await? else {
        return Ok(());
    };
    if !store.update_image_likes(photo_id, likes).await? {
        anyhow::bail!("No image with id {}", photo_id);
    }
    println!("{} now has {} likes", photo_id, likes);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let db_path = config::expand_tilde(&cli.db_path);
    match cli.command {
        Command::Sync {
            sync,
            watch_with_interval,
        } => {
            let config = Config::from_cli(&cli.db_path, sync, None)?;
            run_sync(config, watch_with_interval).await
        }
        Command::Serve {
            sync,
            bind,
            webhook_secret,
        } => {
            let config = Config::from_cli(&cli.db_path, sync, webhook_secret)?;
            run_serve(config, bind).await
        }
        Command::Status => run_status(&db_path).await,
        Command::Export(args) => run_export(&db_path, ExportConfig::from_args(args)).await,
        Command::Star { photo_id, star } => run_star(&db_path, &photo_id, star).await,
        Command::Like { photo_id, likes } => run_like(&db_path, &photo_id, likes).await,
    }
}
