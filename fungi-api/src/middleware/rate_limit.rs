use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use crate::state::AppState;

const WINDOW_SECONDS: i64 = 60;

/// Per client address, fixed one minute window in Redis.
///
/// Passes everything through when Redis is not configured or the peer
/// address is unknown, and fails open when Redis errors.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(limit) = state.rate_limit.as_ref() else {
        return next.run(req).await;
    };
    let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>().copied() else {
        return next.run(req).await;
    };

    let key = format!("ratelimit:{}", addr.ip());
    match limit.client.check_rate_limit(&key, limit.per_minute, WINDOW_SECONDS).await {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::warn!("Rate limit exceeded for {}", addr.ip());
            (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
        }
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, letting request through: {}", e);
            next.run(req).await
        }
    }
}
