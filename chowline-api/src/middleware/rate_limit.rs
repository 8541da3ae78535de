use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chowline_store::redis_repo::rate_limit_key;
use serde_json::json;
use std::net::SocketAddr;

use crate::state::AppState;

/// Per-client fixed window backed by redis. Fails open: no redis, no peer
/// address or a redis error all let the request through.
pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(redis) = state.redis.as_ref() else {
        return next.run(req).await;
    };
    let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>().cloned() else {
        return next.run(req).await;
    };

    let scope = if req.uri().path().starts_with("/v1/webhooks") { "webhooks" } else { "api" };
    let key = rate_limit_key(scope, &addr.ip().to_string());

    match redis
        .check_rate_limit(&key, state.rate_limit.requests, state.rate_limit.window_secs)
        .await
    {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::warn!(client = %addr.ip(), scope, "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "Rate limit exceeded" })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rate limiter unavailable, allowing request");
            next.run(req).await
        }
    }
}
