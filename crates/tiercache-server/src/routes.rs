//! API route definitions

use axum::{
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    handlers::{debug, entries, health, revalidate},
    middleware::logging_middleware,
    state::AppState,
};

/// API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        // On-demand revalidation
        .route("/api/revalidate-tag", get(revalidate::revalidate_tag))
        .route("/api/revalidate-path", get(revalidate::revalidate_path))
        // Inspection
        .route("/api/cache-debug", get(debug::cache_debug))
        .route(
            "/api/cache/*key",
            get(entries::get_entry).put(entries::put_entry),
        )
}

/// Full application with middleware bound to `state`.
pub fn app(state: AppState) -> Router {
    api_routes()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn_with_state(state.clone(), logging_middleware)),
        )
        .with_state(state)
}
