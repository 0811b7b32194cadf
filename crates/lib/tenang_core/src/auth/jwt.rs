//! Signed token codec and signing-secret resolution.
//!
//! Tokens are HS256 JWTs. Decoding never trusts the algorithm declared in the
//! header: only HS256 is accepted.

use std::path::{Path, PathBuf};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};

use super::TokenError;
use crate::models::auth::TokenClaims;

/// The only accepted signing scheme.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// Secrets shorter than this are accepted but logged.
pub const MIN_SECRET_LEN: usize = 32;

/// Sign claims into a compact token string.
pub fn encode_claims(claims: &TokenClaims, secret: &[u8]) -> Result<String, TokenError> {
    encode(
        &Header::new(ALGORITHM),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| TokenError::Encode(format!("jwt encode: {e}")))
}

/// Verify the signature, expiry, not-before and audience of a token.
///
/// The signature is checked before any time-based claim, so an expired token
/// signed with the wrong secret reports `InvalidSignature`, not `Expired`.
/// Issuer and token type are left to the caller.
pub fn decode_claims(
    token: &str,
    secret: &[u8],
    audience: &str,
) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::new(ALGORITHM);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.set_audience(&[audience]);
    validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

    decode::<TokenClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::ImmatureSignature => TokenError::NotYetValid,
            ErrorKind::InvalidAudience => TokenError::WrongAudience,
            _ => TokenError::Malformed(e.to_string()),
        })
}

/// Resolve a signing secret: env var `env_key` → persisted file → generated.
///
/// A generated secret is written to `file_name` under the user data directory
/// so tokens survive restarts in local development.
pub fn resolve_secret(env_key: &str, file_name: &str) -> String {
    if let Ok(secret) = std::env::var(env_key)
        && !secret.is_empty()
    {
        warn_if_weak(env_key, &secret);
        return secret;
    }
    resolve_secret_at(&secret_path(file_name))
}

/// Read the secret persisted at `path`, generating and persisting one if absent.
pub fn resolve_secret_at(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(path, &secret) {
        warn!(path = %path.display(), error = %e, "could not persist generated secret");
    } else {
        info!(path = %path.display(), "generated new signing secret");
    }
    secret
}

fn warn_if_weak(name: &str, secret: &str) {
    if secret.len() < MIN_SECRET_LEN {
        warn!(
            name,
            len = secret.len(),
            "signing secret should be at least {MIN_SECRET_LEN} characters"
        );
    }
}

/// Path to a persisted secret file.
fn secret_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tenang")
        .join(file_name)
}
