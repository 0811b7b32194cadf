//! Handlers reachable without a token.

use axum::Json;

use crate::middleware::auth::AuthorizedIdentity;
use crate::models::{FeedResponse, HealthResponse};

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: tenang_core::version().to_string(),
    })
}

/// `GET /api/v1/feed`: personalised for signed-in callers, generic otherwise.
pub async fn feed_handler(identity: Option<AuthorizedIdentity>) -> Json<FeedResponse> {
    let (personalized, greeting) = match identity {
        Some(identity) => (true, format!("Welcome back, {}", identity.email)),
        None => (false, "Welcome to Tenang".to_string()),
    };
    Json(FeedResponse {
        personalized,
        greeting,
    })
}
