//! Presigned transfer endpoints.

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

/// Query string for downloads.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    pub key: Option<String>,
}

/// Request body for uploads.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// Object key to upload to.
    pub file: String,
}

/// A presigned URL handed to the client.
#[derive(Debug, Serialize, Deserialize)]
pub struct PresignedUrlResponse {
    pub url: String,
}

/// Object keys must name a file, not the root or a folder marker.
fn validate_object_key(key: &str) -> ApiResult<&str> {
    if key.is_empty() {
        return Err(ApiError::BadRequest("object key is required".to_string()));
    }
    if key.ends_with(nimbus_core::KEY_DELIMITER) {
        return Err(ApiError::BadRequest(format!(
            "object key must not end with '{}'",
            nimbus_core::KEY_DELIMITER
        )));
    }
    Ok(key)
}

/// GET /download?key= - Presigned download URL.
pub async fn download(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Json<PresignedUrlResponse>> {
    let key = validate_object_key(query.key.as_deref().unwrap_or_default())?;

    let url = state
        .storage
        .presign_download(key, state.config.server.presign_expiry())
        .await?;

    tracing::info!(subject = %user.claims.subject, key = %key, "issued download URL");
    Ok(Json(PresignedUrlResponse { url }))
}

/// POST /upload - Presigned upload URL.
pub async fn upload(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<UploadRequest>,
) -> ApiResult<Json<PresignedUrlResponse>> {
    let key = validate_object_key(&request.file)?;

    let url = state
        .storage
        .presign_upload(key, state.config.server.presign_expiry())
        .await?;

    tracing::info!(subject = %user.claims.subject, key = %key, "issued upload URL");
    Ok(Json(PresignedUrlResponse { url }))
}
