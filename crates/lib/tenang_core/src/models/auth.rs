//! Authentication domain models.
//!
//! These are internal domain models, distinct from the HTTP response bodies
//! in `tenang_api::models`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Purpose a token was minted for. Selects signing secret and expiry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }

    /// The other purpose.
    pub fn other(self) -> Self {
        match self {
            TokenType::Access => TokenType::Refresh,
            TokenType::Refresh => TokenType::Access,
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much personal data a user has agreed to share.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    Minimal,
    #[default]
    Standard,
    Full,
}

impl PrivacyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyLevel::Minimal => "minimal",
            PrivacyLevel::Standard => "standard",
            PrivacyLevel::Full => "full",
        }
    }
}

impl fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivacyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(PrivacyLevel::Minimal),
            "standard" => Ok(PrivacyLevel::Standard),
            "full" => Ok(PrivacyLevel::Full),
            other => Err(format!("unknown privacy level '{other}'")),
        }
    }
}

/// User record as loaded from the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub privacy_level: PrivacyLevel,
    pub is_active: bool,
    pub last_active_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// An active user with the default privacy level.
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            privacy_level: PrivacyLevel::default(),
            is_active: true,
            last_active_at: None,
        }
    }
}

/// Claims embedded in every signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub privacy_level: PrivacyLevel,
    pub token_type: TokenType,
    /// Regenerated on every refresh; correlates an access/refresh pair.
    pub session_id: String,
    /// Subject, the user id as a string (standard JWT `sub` claim).
    pub sub: String,
    pub iss: String,
    pub aud: Vec<String>,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Not before (unix timestamp).
    pub nbf: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}

/// Access/refresh pair sharing one session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
    /// Always `"Bearer"`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}
