//! Per-user handlers. Ownership of `{userId}` is enforced by middleware.

use axum::Json;

use crate::middleware::auth::AuthorizedIdentity;
use crate::models::SessionResponse;

/// `GET /api/v1/users/{userId}/session`: the caller's resolved identity.
pub async fn session_handler(identity: AuthorizedIdentity) -> Json<SessionResponse> {
    Json(SessionResponse {
        user_id: identity.user_id,
        email: identity.email,
        is_admin: identity.is_admin,
        privacy_level: identity.privacy_level,
        session_id: identity.session_id,
    })
}
