use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::HttpError;
use super::AppState;
use crate::store::{ExifPatch, MAX_STAR};
use crate::types::{SyncStatus, UpdateKind};
use crate::views;

/// Header carrying the shared webhook secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Trigger a full sync. Returns the composite outcome; 500 when it failed.
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, HttpError> {
    let Some(expected) = state.webhook_secret.as_deref() else {
        return Err(HttpError::WebhookDisabled);
    };
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !secrets_match(provided, expected) {
        tracing::warn!("Rejected webhook call with a bad secret");
        return Err(HttpError::Unauthorized);
    }

    tracing::info!("Webhook triggered sync");
    let outcome = state.sync.run().await;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(outcome)).into_response())
}

fn secrets_match(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len()
        && provided
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

pub async fn albums(State(state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(views::albums_map(state.store.as_ref()).await?))
}

pub async fn album(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    match views::album_detail(state.store.as_ref(), &id).await? {
        Some(detail) => Ok(Json(detail)),
        None => Err(HttpError::NotFound(format!("Album {id} not found"))),
    }
}

pub async fn exif(State(state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(views::exif_map(state.store.as_ref()).await?))
}

pub async fn map(State(state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(views::map_points(state.store.as_ref()).await?))
}

pub async fn status(State(state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(views::status_report(state.store.as_ref()).await?))
}

/// Download a consistent copy of the cache database.
pub async fn backup(State(state): State<AppState>) -> Result<Response, HttpError> {
    let dir = tempfile::tempdir().map_err(|e| HttpError::Internal(e.to_string()))?;
    let path = dir.path().join("gallery.db");
    state.store.snapshot(&path).await?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| HttpError::Internal(e.to_string()))?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
    let disposition = format!("attachment; filename=\"gallery-backup-{timestamp}.db\"");
    tracing::info!(bytes = bytes.len(), "Serving database backup");

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        )
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(bytes))
        .map_err(|e| HttpError::Internal(e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarRequest {
    pub photo_id: String,
    pub star: i64,
}

pub async fn update_star(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<StarRequest>, HttpError>,
) -> Result<Json<Value>, HttpError> {
    let star = u8::try_from(request.star)
        .ok()
        .filter(|s| *s <= MAX_STAR)
        .ok_or_else(|| {
            HttpError::BadRequest(format!("star must be between 0 and {MAX_STAR}"))
        })?;

    if !state.store.update_image_star(&request.photo_id, star).await? {
        return Err(HttpError::NotFound(format!(
            "Photo {} not found",
            request.photo_id
        )));
    }
    tracing::info!(photo = %request.photo_id, star, "Updated star rating");
    Ok(Json(json!({ "success": true, "star": star })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifUpdateRequest {
    pub photo_id: Option<String>,
    pub exif_data: Option<ExifPatch>,
}

pub async fn update_exif(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<ExifUpdateRequest>, HttpError>,
) -> Result<Json<Value>, HttpError> {
    let photo_id = request
        .photo_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| HttpError::BadRequest("photoId is required".to_string()))?;
    let patch = request
        .exif_data
        .ok_or_else(|| HttpError::BadRequest("exifData must be an object".to_string()))?;

    if !state.store.update_exif(&photo_id, &patch).await? {
        return Err(HttpError::NotFound(format!("Photo {photo_id} not found")));
    }
    let message = format!("Updated EXIF data for {photo_id}");
    if let Err(e) = state
        .store
        .log_update(UpdateKind::Exif, SyncStatus::Success, Some(&message), None)
        .await
    {
        tracing::warn!(error = %e, "Failed to record EXIF edit");
    }
    tracing::info!(photo = %photo_id, "Updated EXIF data");
    Ok(Json(json!({ "success": true, "message": message })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
    pub photo_id: String,
    pub likes: i64,
}

pub async fn like(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<LikeRequest>, HttpError>,
) -> Result<Json<Value>, HttpError> {
    let likes = u64::try_from(request.likes)
        .map_err(|_| HttpError::BadRequest("likes must not be negative".to_string()))?;

    if !state.store.update_image_likes(&request.photo_id, likes).await? {
        return Err(HttpError::NotFound(format!(
            "Photo {} not found",
            request.photo_id
        )));
    }
    tracing::debug!(photo = %request.photo_id, likes, "Updated likes");
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("hook", "hook"));
        assert!(!secrets_match("hoox", "hook"));
        assert!(!secrets_match("hoo", "hook"));
        assert!(!secrets_match("", "hook"));
    }
}
