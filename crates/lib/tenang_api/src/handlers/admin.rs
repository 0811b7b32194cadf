//! Admin-only handlers.

use axum::Json;
use axum::extract::State;
use tenang_core::admission::LimiterUsage;

use crate::AppState;

/// `GET /api/v1/admin/rate-limits`: snapshot of tracked clients.
pub async fn rate_limits_handler(State(state): State<AppState>) -> Json<LimiterUsage> {
    Json(state.limiter.usage())
}
