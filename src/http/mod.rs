//! HTTP API: read projections of the cache, curation endpoints, and the
//! webhook that triggers a sync. Handlers are thin wrappers over
//! [`crate::views`], [`crate::store`] and [`crate::sync`].

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::store::GalleryStore;
use crate::sync::SyncEngine;

pub use error::HttpError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GalleryStore>,
    pub sync: SyncEngine,
    /// Webhook is disabled when `None`.
    pub webhook_secret: Option<Arc<str>>,
}

/// Data responses must always reflect the latest sync.
async fn no_store_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers.insert(
        HeaderName::from_static("surrogate-control"),
        HeaderValue::from_static("no-store"),
    );
    response
}

pub fn router(state: AppState) -> Router {
    let data = Router::new()
        .route("/albums", get(handlers::albums))
        .route("/albums/:id", get(handlers::album))
        .route("/exif", get(handlers::exif))
        .route("/map", get(handlers::map))
        .route("/status", get(handlers::status))
        .route("/backup", get(handlers::backup))
        .layer(middleware::from_fn(no_store_headers));

    Router::new()
        .nest("/api/data", data)
        .route("/api/webhook", post(handlers::webhook))
        .route("/api/photos/update-star", post(handlers::update_star))
        .route("/api/photos/update-exif", post(handlers::update_exif))
        .route("/api/like", post(handlers::like))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("Listening on http://{}", addr);
    if state.webhook_secret.is_none() {
        tracing::warn!("No webhook secret configured, /api/webhook is disabled");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tracing::info!("Shutting down HTTP server");
        })
        .await?;
    Ok(())
}
