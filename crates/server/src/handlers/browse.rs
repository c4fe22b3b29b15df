//! Bucket browsing endpoints.

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{BROWSE_DURATION, FOLDER_SIZE_TIMEOUTS};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use nimbus_core::Folder;
use nimbus_storage::{aggregate_size, build_tree, list_level};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Query string for folder-scoped endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct FolderQuery {
    /// Folder prefix; empty or missing means the bucket root.
    #[serde(default)]
    pub prefix: String,
}

/// Response for a folder size computation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FolderSizeResponse {
    pub size: u64,
}

fn observe(operation: &str, started: Instant) {
    BROWSE_DURATION
        .with_label_values(&[operation])
        .observe(started.elapsed().as_secs_f64());
}

/// GET /list - Full recursive tree of the bucket.
pub async fn list_tree(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Folder>> {
    let started = Instant::now();
    let listing = &state.config.listing;

    let tree = build_tree(
        state.storage.as_ref(),
        listing.effective_page_size(),
        listing.folder_timestamps,
    )
    .await?;

    observe("list", started);
    tracing::debug!(
        subject = %user.claims.subject,
        size = tree.size(),
        "listed bucket tree"
    );
    Ok(Json(tree))
}

/// GET /folder?prefix= - One level of a folder.
pub async fn list_folder(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<FolderQuery>,
) -> ApiResult<Json<Folder>> {
    let started = Instant::now();

    let listing = &state.config.listing;
    let level = list_level(
        state.storage.as_ref(),
        &query.prefix,
        listing.effective_page_size(),
        listing.folder_timestamps,
    )
    .await?;

    observe("folder", started);
    tracing::debug!(
        prefix = %query.prefix,
        items = level.items().len(),
        "listed folder"
    );
    Ok(Json(level))
}

/// GET /folder/size?prefix= - Total size of every object under a folder.
///
/// The computation is bounded by `server.folder_size_timeout_ms`. When the
/// deadline passes the aggregation future is dropped, which stops the page
/// stream from issuing further listing requests.
pub async fn folder_size(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<FolderQuery>,
) -> ApiResult<Json<FolderSizeResponse>> {
    let started = Instant::now();
    let timeout = state.config.server.folder_size_timeout();

    let aggregation = aggregate_size(
        state.storage.as_ref(),
        &query.prefix,
        state.config.listing.effective_page_size(),
    );

    match tokio::time::timeout(timeout, aggregation).await {
        Ok(result) => {
            let size = result?;
            observe("folder_size", started);
            Ok(Json(FolderSizeResponse { size }))
        }
        Err(_) => {
            FOLDER_SIZE_TIMEOUTS.inc();
            tracing::warn!(
                prefix = %query.prefix,
                timeout_ms = timeout.as_millis() as u64,
                "folder size computation timed out"
            );
            Err(ApiError::Timeout(timeout))
        }
    }
}
