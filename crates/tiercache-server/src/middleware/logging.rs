//! Request logging middleware

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

const SLOW_REQUEST: Duration = Duration::from_millis(100);

/// Logs each request and runs it in its own read memoization scope.
pub async fn logging_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    tracing::debug!("Request: {} {}", method, uri);

    let start = Instant::now();
    let response = state.cache.request_scope(next.run(request)).await;
    let duration = start.elapsed();

    if duration > SLOW_REQUEST {
        tracing::warn!("Slow request: {} {} took {:?}", method, uri, duration);
    }

    tracing::info!(
        "Response: {} {} - {} in {}ms",
        method,
        uri,
        response.status(),
        duration.as_millis()
    );

    response
}
