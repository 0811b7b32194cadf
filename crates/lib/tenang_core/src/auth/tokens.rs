//! Token service: issues and validates access/refresh tokens.
//!
//! Each purpose has its own signing secret. Validation does not pick the
//! verification key from the token's own claims. It verifies against the
//! expected purpose's secret first, then the other one, and requires the
//! claimed purpose to agree with the key that actually verified it.
//!
//! Rotated refresh tokens are not revoked server-side. A refresh token stays
//! valid until its natural expiry even after it has been exchanged.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use super::store::UserStore;
use super::{AuthError, TokenError, jwt};
use crate::models::auth::{TokenClaims, TokenPair, TokenType, UserRecord};

/// Access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_EXPIRY_SECS: i64 = 15 * 60;

/// Refresh token lifetime: 7 days.
pub const REFRESH_TOKEN_EXPIRY_SECS: i64 = 7 * 24 * 60 * 60;

pub const DEFAULT_ISSUER: &str = "tenang.in";
pub const DEFAULT_AUDIENCE: &str = "tenang.in-users";

/// Accounts under this email domain are platform administrators.
pub const DEFAULT_ADMIN_DOMAIN: &str = "tenang.in";

/// Signing and expiry policy for both token purposes.
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
    pub audience: String,
    pub admin_domain: String,
}

impl TokenConfig {
    /// Config with the given secrets and default lifetimes and issuer.
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: Duration::seconds(ACCESS_TOKEN_EXPIRY_SECS),
            refresh_ttl: Duration::seconds(REFRESH_TOKEN_EXPIRY_SECS),
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            admin_domain: DEFAULT_ADMIN_DOMAIN.to_string(),
        }
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("admin_domain", &self.admin_domain)
            .finish()
    }
}

/// Issues, validates and rotates signed tokens.
#[derive(Clone, Debug)]
pub struct TokenService {
    config: TokenConfig,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn secret(&self, token_type: TokenType) -> &[u8] {
        match token_type {
            TokenType::Access => self.config.access_secret.as_bytes(),
            TokenType::Refresh => self.config.refresh_secret.as_bytes(),
        }
    }

    fn ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.config.access_ttl,
            TokenType::Refresh => self.config.refresh_ttl,
        }
    }

    /// Whether `email` carries the administrator marker.
    pub fn is_admin(&self, email: &str) -> bool {
        email
            .rsplit_once('@')
            .is_some_and(|(_, domain)| domain.eq_ignore_ascii_case(&self.config.admin_domain))
    }

    /// Mint a token for `user` valid from now.
    pub fn issue(
        &self,
        user: &UserRecord,
        token_type: TokenType,
        session_id: &str,
    ) -> Result<String, TokenError> {
        self.issue_at(user, token_type, session_id, Utc::now())
    }

    /// Mint a token as if issued at `now`.
    pub fn issue_at(
        &self,
        user: &UserRecord,
        token_type: TokenType,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let expires_at = now
            .checked_add_signed(self.ttl(token_type))
            .ok_or_else(|| {
                TokenError::Encode(format!("{token_type} token expiry out of range"))
            })?;
        let claims = TokenClaims {
            user_id: user.id,
            email: user.email.clone(),
            is_admin: self.is_admin(&user.email),
            privacy_level: user.privacy_level,
            token_type,
            session_id: session_id.to_string(),
            sub: user.id.to_string(),
            iss: self.config.issuer.clone(),
            aud: vec![self.config.audience.clone()],
            exp: expires_at.timestamp(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
        };
        jwt::encode_claims(&claims, self.secret(token_type))
    }

    /// Mint an access/refresh pair under a fresh session id.
    pub fn issue_pair(&self, user: &UserRecord) -> Result<TokenPair, TokenError> {
        let session_id = Uuid::new_v4().to_string();
        Ok(TokenPair {
            access_token: self.issue(user, TokenType::Access, &session_id)?,
            refresh_token: self.issue(user, TokenType::Refresh, &session_id)?,
            session_id,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_ttl.num_seconds(),
        })
    }

    fn decode_as(&self, token: &str, key: TokenType) -> Result<TokenClaims, TokenError> {
        jwt::decode_claims(token, self.secret(key), &self.config.audience)
    }

    /// Validate `token` for `expected` use.
    ///
    /// Checks run in order: signature, expiry, token type, issuer.
    pub fn validate(&self, token: &str, expected: TokenType) -> Result<TokenClaims, TokenError> {
        let (claims, signed_as) = match self.decode_as(token, expected) {
            Ok(claims) => (claims, expected),
            Err(TokenError::InvalidSignature) => {
                let other = expected.other();
                (self.decode_as(token, other)?, other)
            }
            Err(e) => return Err(e),
        };

        let shared_secret = self.config.access_secret == self.config.refresh_secret;
        if claims.token_type != signed_as && !shared_secret {
            return Err(TokenError::Malformed(format!(
                "{} token signed with the {} secret",
                claims.token_type, signed_as
            )));
        }
        if claims.token_type != expected {
            return Err(TokenError::WrongType {
                expected,
                actual: claims.token_type,
            });
        }
        if claims.iss != self.config.issuer {
            return Err(TokenError::WrongIssuer(claims.iss));
        }
        Ok(claims)
    }

    /// Exchange a refresh token for a fresh pair under a new session id.
    pub async fn rotate<S>(&self, users: &S, refresh_token: &str) -> Result<TokenPair, AuthError>
    where
        S: UserStore + ?Sized,
    {
        let claims = self.validate(refresh_token, TokenType::Refresh)?;
        let user = users
            .find_active(claims.user_id)
            .await?
            .ok_or(AuthError::UserNotFoundOrInactive)?;
        let pair = self.issue_pair(&user)?;
        debug!(
            user_id = %user.id,
            old_session = %claims.session_id,
            new_session = %pair.session_id,
            "rotated token pair"
        );
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryUserStore;

    fn service() -> TokenService {
        TokenService::new(TokenConfig::new(
            "access-secret-access-secret-access",
            "refresh-secret-refresh-secret-refr",
        ))
    }

    fn user() -> UserRecord {
        UserRecord::new(Uuid::new_v4(), "sari@example.com")
    }

    #[test]
    fn overflowing_ttl_is_an_encode_error() {
        let mut config = TokenConfig::new(
            "access-secret-access-secret-access",
            "refresh-secret-refresh-secret-refr",
        );
        config.access_ttl = Duration::MAX;
        let svc = TokenService::new(config);

        let err = svc.issue(&user(), TokenType::Access, "s").unwrap_err();
        assert!(matches!(err, TokenError::Encode(_)), "{err:?}");
        assert!(svc.issue(&user(), TokenType::Refresh, "s").is_ok());
    }

    #[test]
    fn validate_accepts_what_issue_mints() {
        let svc = service();
        let user = user();
        for token_type in [TokenType::Access, TokenType::Refresh] {
            let token = svc.issue(&user, token_type, "session-1").unwrap();
            let claims = svc.validate(&token, token_type).unwrap();
            assert_eq!(claims.user_id, user.id);
            assert_eq!(claims.sub, user.id.to_string());
            assert_eq!(claims.session_id, "session-1");
            assert_eq!(claims.token_type, token_type);
            assert_eq!(claims.iss, DEFAULT_ISSUER);
        }
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let svc = service();
        let token = svc.issue(&user(), TokenType::Access, "s").unwrap();
        assert_eq!(
            svc.validate(&token, TokenType::Refresh),
            Err(TokenError::WrongType {
                expected: TokenType::Refresh,
                actual: TokenType::Access,
            })
        );
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let svc = service();
        let token = svc.issue(&user(), TokenType::Refresh, "s").unwrap();
        assert_eq!(
            svc.validate(&token, TokenType::Access),
            Err(TokenError::WrongType {
                expected: TokenType::Access,
                actual: TokenType::Refresh,
            })
        );
    }

    #[test]
    fn wrong_type_detected_with_shared_secret() {
        let svc = TokenService::new(TokenConfig::new("same", "same"));
        let token = svc.issue(&user(), TokenType::Refresh, "s").unwrap();
        assert!(matches!(
            svc.validate(&token, TokenType::Access),
            Err(TokenError::WrongType { .. })
        ));
    }

    #[test]
    fn expired_token_reports_expired() {
        let svc = service();
        let issued = Utc::now() - Duration::hours(2);
        let token = svc
            .issue_at(&user(), TokenType::Access, "s", issued)
            .unwrap();
        assert_eq!(
            svc.validate(&token, TokenType::Access),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn foreign_issuer_rejected() {
        let svc = service();
        let mut other_config = svc.config().clone();
        other_config.issuer = "elsewhere.example".into();
        let token = TokenService::new(other_config)
            .issue(&user(), TokenType::Access, "s")
            .unwrap();
        assert_eq!(
            svc.validate(&token, TokenType::Access),
            Err(TokenError::WrongIssuer("elsewhere.example".into()))
        );
    }

    #[test]
    fn unknown_secret_rejected() {
        let token = TokenService::new(TokenConfig::new("x", "y"))
            .issue(&user(), TokenType::Access, "s")
            .unwrap();
        assert_eq!(
            service().validate(&token, TokenType::Access),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn admin_marker_follows_email_domain() {
        let svc = service();
        let admin = UserRecord::new(Uuid::new_v4(), "ops@Tenang.in");
        let token = svc.issue(&admin, TokenType::Access, "s").unwrap();
        assert!(svc.validate(&token, TokenType::Access).unwrap().is_admin);
        assert!(!svc.is_admin("ops@nottenang.in"));
        assert!(!svc.is_admin("tenang.in"));
    }

    #[test]
    fn pair_shares_session_and_reports_access_ttl() {
        let svc = service();
        let pair = svc.issue_pair(&user()).unwrap();
        let access = svc.validate(&pair.access_token, TokenType::Access).unwrap();
        let refresh = svc.validate(&pair.refresh_token, TokenType::Refresh).unwrap();
        assert_eq!(access.session_id, pair.session_id);
        assert_eq!(refresh.session_id, pair.session_id);
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, ACCESS_TOKEN_EXPIRY_SECS);
    }

    #[tokio::test]
    async fn rotate_issues_new_session() {
        let svc = service();
        let store = MemoryUserStore::new();
        let user = user();
        store.insert(user.clone());

        let original = svc.issue_pair(&user).unwrap();
        let rotated = svc.rotate(&store, &original.refresh_token).await.unwrap();
        assert_ne!(rotated.session_id, original.session_id);

        // The exchanged refresh token is still honoured.
        assert!(svc.rotate(&store, &original.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn rotate_rejects_access_token_and_inactive_user() {
        let svc = service();
        let store = MemoryUserStore::new();
        let mut user = user();
        store.insert(user.clone());

        let pair = svc.issue_pair(&user).unwrap();
        assert!(matches!(
            svc.rotate(&store, &pair.access_token).await,
            Err(AuthError::Token(TokenError::WrongType { .. }))
        ));

        user.is_active = false;
        store.insert(user);
        assert!(matches!(
            svc.rotate(&store, &pair.refresh_token).await,
            Err(AuthError::UserNotFoundOrInactive)
        ));
    }
}
