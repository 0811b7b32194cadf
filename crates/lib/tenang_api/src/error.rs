//! Application error types.

use std::fmt;

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use chrono::SecondsFormat;
use tenang_core::admission::{Denied, EndpointClass};
use tenang_core::auth::{AuthError, StoreError, TokenError};
use thiserror::Error;
use tracing::error;

use crate::middleware::rate_limit::{
    X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
use crate::models::{ErrorResponse, RateLimitResponse};

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Reason a request was refused with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingToken,
    InvalidFormat,
    InvalidToken,
    TokenExpired,
    UserNotFound,
    AuthRequired,
}

impl AuthFailure {
    pub fn code(&self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "missing_token",
            AuthFailure::InvalidFormat => "invalid_format",
            AuthFailure::InvalidToken => "invalid_token",
            AuthFailure::TokenExpired => "token_expired",
            AuthFailure::UserNotFound => "user_not_found",
            AuthFailure::AuthRequired => "auth_required",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "Authorization header required",
            AuthFailure::InvalidFormat => "Invalid authorization header format",
            AuthFailure::InvalidToken => "Invalid or expired token",
            AuthFailure::TokenExpired => "Token has expired",
            AuthFailure::UserNotFound => "User account not found or inactive",
            AuthFailure::AuthRequired => "Authentication required",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Reason an authenticated request was refused with 403.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenial {
    AdminRequired,
    AccessDenied,
}

impl AccessDenial {
    pub fn code(&self) -> &'static str {
        match self {
            AccessDenial::AdminRequired => "admin_required",
            AccessDenial::AccessDenied => "access_denied",
        }
    }

    fn parts(&self) -> (&'static str, &'static str) {
        match self {
            AccessDenial::AdminRequired => (
                "Admin access required",
                "This endpoint requires administrator privileges",
            ),
            AccessDenial::AccessDenied => (
                "Access Denied",
                "You do not have permission to access this resource.",
            ),
        }
    }
}

impl fmt::Display for AccessDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A quota denial, with the retry delay computed at denial time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimited {
    pub denied: Denied,
    pub retry_after: i64,
}

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(AuthFailure),

    #[error("Forbidden: {0}")]
    Forbidden(AccessDenial),

    #[error("Validation error: {code}: {message}")]
    Validation { code: &'static str, message: String },

    #[error("Rate limit exceeded for {} endpoints", .0.denied.class)]
    RateLimited(Box<RateLimited>),

    #[error("Internal server error")]
    Internal(String),
}

const AUTH_SUPPORT: &str = "If you're experiencing issues, please reach out to our support team.";

/// `(message, support)` shown to a throttled caller.
fn denial_copy(class: EndpointClass) -> (&'static str, &'static str) {
    match class {
        EndpointClass::Crisis => (
            "Our crisis support service is under heavy demand. Please wait a moment before trying again.",
            "If this is an emergency, call the crisis hotline 119 or message WhatsApp 081-111-500-711.",
        ),
        EndpointClass::Chat => (
            "Chat is busy helping many people right now. Please wait a moment to continue the conversation.",
            "We want every conversation to get our full attention.",
        ),
        EndpointClass::Community => (
            "Too much community activity in a short time. Please wait a moment before interacting again.",
            "This keeps discussions healthy for everyone in the community.",
        ),
        EndpointClass::Auth => (
            "Too many sign-in attempts. Please wait a moment to keep your account safe.",
            "If you forgot your password, use the password reset feature.",
        ),
        EndpointClass::Admin | EndpointClass::Public => (
            "Too many requests in a short time. Please wait a moment before trying again.",
            "This keeps the platform responsive for everyone.",
        ),
    }
}

fn error_body(
    error: &str,
    code: &str,
    message: &str,
    support: Option<&str>,
) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: error.to_string(),
        code: code.to_string(),
        message: message.to_string(),
        support: support.map(str::to_string),
    })
}

fn rate_limited_response(limited: &RateLimited) -> Response {
    let denied = &limited.denied;
    let (message, support) = denial_copy(denied.class);

    let mut headers = HeaderMap::new();
    headers.insert(RETRY_AFTER, HeaderValue::from(limited.retry_after));
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(denied.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(denied.reset_at.timestamp()));

    let body = Json(RateLimitResponse {
        error: "Rate limit exceeded".to_string(),
        message: message.to_string(),
        support: support.to_string(),
        retry_after: limited.retry_after,
        reset_time: denied.reset_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        endpoint_type: denied.class.to_string(),
    });
    (StatusCode::TOO_MANY_REQUESTS, headers, body).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Unauthorized(failure) => (
                StatusCode::UNAUTHORIZED,
                error_body(
                    "Authentication failed",
                    failure.code(),
                    failure.message(),
                    Some(AUTH_SUPPORT),
                ),
            )
                .into_response(),
            AppError::Forbidden(denial) => {
                let (error, message) = denial.parts();
                (
                    StatusCode::FORBIDDEN,
                    error_body(error, denial.code(), message, None),
                )
                    .into_response()
            }
            AppError::Validation { code, message } => (
                StatusCode::BAD_REQUEST,
                error_body("Invalid request", code, message, None),
            )
                .into_response(),
            AppError::RateLimited(limited) => rate_limited_response(limited),
            AppError::Internal(detail) => {
                error!(detail = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body(
                        "Internal server error",
                        "internal_error",
                        "Internal server error",
                        None,
                    ),
                )
                    .into_response()
            }
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AppError::Unauthorized(AuthFailure::TokenExpired),
            TokenError::Encode(msg) => AppError::Internal(msg),
            _ => AppError::Unauthorized(AuthFailure::InvalidToken),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Token(e) => AppError::from(e),
            AuthError::UserNotFoundOrInactive => AppError::Unauthorized(AuthFailure::UserNotFound),
            AuthError::Store(e) => AppError::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenang_core::models::auth::TokenType;

    #[test]
    fn token_errors_map_to_distinct_codes() {
        let code = |e: TokenError| match AppError::from(e) {
            AppError::Unauthorized(f) => f.code(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(code(TokenError::Expired), "token_expired");
        assert_eq!(code(TokenError::InvalidSignature), "invalid_token");
        assert_eq!(
            code(TokenError::WrongType {
                expected: TokenType::Access,
                actual: TokenType::Refresh
            }),
            "invalid_token"
        );
        assert_eq!(code(TokenError::WrongIssuer("x".into())), "invalid_token");
    }

    #[test]
    fn store_errors_are_internal() {
        let err = AppError::from(StoreError::Decode("bad row".into()));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
