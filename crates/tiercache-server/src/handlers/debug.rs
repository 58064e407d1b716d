//! Cache inspection endpoint
//!
//! Reports configuration presence and counters only; the connection URL and
//! cached values are never included.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use tiercache::tag_index::DEFAULT_SHARED_TAGS_KEY;

use crate::{models::DebugQuery, state::AppState};

pub const AVAILABLE_ACTIONS: [&str; 4] = ["status", "keys", "tags", "env"];

/// `GET /api/cache-debug?action=status|keys|tags|env`
pub async fn cache_debug(
    State(state): State<AppState>,
    Query(query): Query<DebugQuery>,
) -> impl IntoResponse {
    let action = query.action.unwrap_or_else(|| "status".to_string());
    let prefix = state.key_prefix();

    let mut info = Map::new();
    info.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
    info.insert("action".into(), json!(action));

    match action.as_str() {
        "status" => {
            info.insert("message".into(), json!("Cache handler is configured"));
            info.insert("cacheHandler".into(), json!(state.cache.name()));
            info.insert("stats".into(), json!(state.cache.stats()));
            info.insert(
                "note".into(),
                json!("Use action=keys to see cache keys, action=tags to see tag mappings"),
            );
        }
        "keys" => {
            info.insert(
                "message".into(),
                json!(format!("To inspect Redis keys, use redis-cli: KEYS {prefix}*")),
            );
            info.insert("keyPrefix".into(), json!(prefix));
            info.insert(
                "suggestion".into(),
                json!(format!("Run: redis-cli KEYS '{prefix}*' to see all cache keys")),
            );
        }
        "tags" => {
            let tags_key = format!("{prefix}{DEFAULT_SHARED_TAGS_KEY}");
            info.insert(
                "message".into(),
                json!(format!("To inspect tag mappings, use redis-cli: HGETALL {tags_key}")),
            );
            info.insert("sharedTagsKey".into(), json!(tags_key));
        }
        "env" => {
            let settings = &state.settings;
            info.insert("message".into(), json!("Environment configuration"));
            info.insert(
                "environment".into(),
                json!({
                    "redisUrl": if settings.redis_url.is_some() { "configured" } else { "not configured" },
                    "singleConnection": settings.single_connection,
                    "debug": settings.debug,
                    "buildId": settings.build_id,
                    "keyPrefix": prefix,
                }),
            );
        }
        _ => {
            info.insert("message".into(), json!("Unknown action"));
            info.insert("availableActions".into(), json!(AVAILABLE_ACTIONS));
        }
    }

    (
        [(header::CACHE_CONTROL, "no-store, must-revalidate")],
        Json(Value::Object(info)),
    )
}
