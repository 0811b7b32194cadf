//! Authentication logic.
//!
//! Provides the signed-token codec, the token service that issues and
//! validates access/refresh pairs, and the user-store seam the token service
//! and the HTTP layer load accounts through.

pub mod jwt;
pub mod queries;
pub mod store;
pub mod tokens;

use thiserror::Error;

use crate::models::auth::TokenType;

/// Why a presented token was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Not a structurally valid token, or signed with an unsupported scheme.
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token is not valid yet")]
    NotYetValid,

    #[error("Expected {expected} token, got {actual}")]
    WrongType {
        expected: TokenType,
        actual: TokenType,
    },

    #[error("Token issuer '{0}' is not trusted")]
    WrongIssuer(String),

    #[error("Token audience is not accepted")]
    WrongAudience,

    #[error("Token encoding failed: {0}")]
    Encode(String),
}

/// User store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Corrupt user record: {0}")]
    Decode(String),
}

/// Authentication errors for flows that also consult the user store.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("User account not found or inactive")]
    UserNotFoundOrInactive,

    #[error(transparent)]
    Store(#[from] StoreError),
}
