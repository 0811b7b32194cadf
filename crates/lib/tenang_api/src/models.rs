//! Request and response bodies.

use serde::{Deserialize, Serialize};
use tenang_core::models::auth::{PrivacyLevel, TokenPair};
use uuid::Uuid;

/// Error body for 400/401/403/500 responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support: Option<String>,
}

/// Error body for 429 responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResponse {
    pub error: String,
    pub message: String,
    pub support: String,
    /// Seconds until the window resets.
    pub retry_after: i64,
    /// RFC 3339 UTC timestamp of the reset.
    pub reset_time: String,
    pub endpoint_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub message: String,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// The caller's own session, as seen by the admission layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub privacy_level: PrivacyLevel,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedResponse {
    pub personalized: bool,
    pub greeting: String,
}
