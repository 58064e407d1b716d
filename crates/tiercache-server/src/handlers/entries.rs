//! Direct entry access through the cache handler

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tiercache::{tags::implicit_tags_for_path, SetOptions};

use crate::{
    error::{ApiError, ApiResult},
    models::{EntryResponse, PathQuery, PutEntryRequest},
    state::AppState,
};

/// `GET /api/cache/*key[?path=...]`
///
/// The optional `path` supplies the implicit tags of the page being read.
pub async fn get_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<EntryResponse>> {
    let implicit_tags = query
        .path
        .as_deref()
        .map(implicit_tags_for_path)
        .unwrap_or_default();

    match state.cache.get(&key, &implicit_tags).await? {
        Some(entry) => Ok(Json(EntryResponse { key, entry })),
        None => Err(ApiError::NotFound(format!("No cache entry for `{key}`"))),
    }
}

/// `PUT /api/cache/*key`
pub async fn put_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<PutEntryRequest>,
) -> ApiResult<StatusCode> {
    let options = SetOptions {
        tags: request.tags,
        revalidate: request.revalidate,
        last_modified: None,
    };
    state.cache.set(&key, request.value, &options).await?;
    Ok(StatusCode::NO_CONTENT)
}
