//! On-demand revalidation endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    models::{PathQuery, RevalidatePathResponse, RevalidateTagResponse, TagQuery},
    state::AppState,
};

/// `GET /api/revalidate-tag?tag=...`
pub async fn revalidate_tag(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
) -> ApiResult<Json<RevalidateTagResponse>> {
    let tag = required(query.tag, "Tag parameter is required")?;

    state
        .cache
        .revalidate_tag(&tag, None)
        .await
        .map_err(ApiError::revalidation)?;
    info!(tag = %tag, "Tag revalidated");

    Ok(Json(RevalidateTagResponse {
        revalidated: true,
        tag,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// `GET /api/revalidate-path?path=...`
pub async fn revalidate_path(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<RevalidatePathResponse>> {
    let path = required(query.path, "Path parameter is required")?;

    state
        .cache
        .revalidate_path(&path)
        .await
        .map_err(ApiError::revalidation)?;
    info!(path = %path, "Path revalidated");

    Ok(Json(RevalidatePathResponse {
        revalidated: true,
        path,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

fn required(value: Option<String>, message: &str) -> ApiResult<String> {
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}
