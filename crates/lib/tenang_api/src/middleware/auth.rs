//! Authentication middleware: Bearer token extraction, token validation,
//! account checks, and the admin and ownership guards layered on top.

use std::convert::Infallible;

use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{FromRequestParts, OptionalFromRequestParts, RawPathParams, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, request::Parts};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use serde::Serialize;
use tenang_core::models::auth::{PrivacyLevel, TokenClaims, TokenType};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AccessDenial, AppError, AuthFailure};
use crate::middleware::rate_limit::{client_ip, user_agent};

/// Route parameter naming the user a resource belongs to.
pub const OWNER_PARAM: &str = "userId";

/// The authenticated caller, attached to request extensions.
///
/// Handlers take this as an extractor and never re-derive trust from headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizedIdentity {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub privacy_level: PrivacyLevel,
    pub session_id: String,
}

impl AuthorizedIdentity {
    fn from_claims(claims: TokenClaims, privacy_level: PrivacyLevel) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
            is_admin: claims.is_admin,
            privacy_level,
            session_id: claims.session_id,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthorizedIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthorizedIdentity>()
            .cloned()
            .ok_or(AppError::Unauthorized(AuthFailure::AuthRequired))
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for AuthorizedIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthorizedIdentity>().cloned())
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthFailure> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthFailure::MissingToken)?
        .to_str()
        .map_err(|_| AuthFailure::InvalidFormat)?;
    if header.is_empty() {
        return Err(AuthFailure::MissingToken);
    }

    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(AuthFailure::InvalidFormat),
    }
}

/// Resolve the caller: validate the access token, then require an active account.
///
/// Refreshing "last seen" is best-effort; a store failure there is logged
/// and does not fail the request.
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthorizedIdentity, AppError> {
    let token = bearer_token(headers).map_err(AppError::Unauthorized)?;
    let claims = state.tokens.validate(token, TokenType::Access)?;

    let user = state
        .users
        .find_active(claims.user_id)
        .await?
        .ok_or(AppError::Unauthorized(AuthFailure::UserNotFound))?;

    if let Err(e) = state.users.touch_last_seen(user.id, Utc::now()).await {
        warn!(user_id = %user.id, error = %e, "could not refresh last seen");
    }

    Ok(AuthorizedIdentity::from_claims(claims, user.privacy_level))
}

fn log_auth_failure(request: &Request, error: &AppError, trust_proxy_headers: bool) {
    if let AppError::Unauthorized(failure) = error {
        warn!(
            code = failure.code(),
            client = %client_ip(request, trust_proxy_headers),
            user_agent = user_agent(request),
            "authentication failed"
        );
    }
}

/// Axum middleware: authenticate the caller and attach `AuthorizedIdentity`,
/// or stop the chain with 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match authenticate(&state, request.headers()).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(e) => {
            log_auth_failure(&request, &e, state.config.trust_proxy_headers);
            Err(e)
        }
    }
}

/// Axum middleware: attach `AuthorizedIdentity` when a valid access token is
/// presented. Missing or invalid tokens are not an error.
///
/// The account is not loaded; privacy level comes from the token.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = match bearer_token(request.headers()) {
        Ok(token) => match state.tokens.validate(token, TokenType::Access) {
            Ok(claims) => {
                let privacy_level = claims.privacy_level;
                Some(AuthorizedIdentity::from_claims(claims, privacy_level))
            }
            Err(e) => {
                debug!(error = %e, "ignoring invalid token on optional-auth route");
                None
            }
        },
        Err(_) => None,
    };
    if let Some(identity) = identity {
        request.extensions_mut().insert(identity);
    }
    next.run(request).await
}

/// Axum middleware: require an authenticated administrator. Layer inside `require_auth`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let identity = request
        .extensions()
        .get::<AuthorizedIdentity>()
        .ok_or(AppError::Unauthorized(AuthFailure::AuthRequired))?;
    if !identity.is_admin {
        return Err(AppError::Forbidden(AccessDenial::AdminRequired));
    }
    Ok(next.run(request).await)
}

fn invalid_owner_id() -> AppError {
    AppError::Validation {
        code: "invalid_user_id_format",
        message: "Invalid user ID format in URL".into(),
    }
}

/// Check that `identity` may touch data owned by the raw `owner` route value.
///
/// Administrators are exempt, before the owner id is even parsed.
pub fn check_owner(identity: &AuthorizedIdentity, owner: &str) -> Result<(), AppError> {
    if identity.is_admin {
        return Ok(());
    }
    let owner = Uuid::parse_str(owner).map_err(|_| invalid_owner_id())?;
    if owner != identity.user_id {
        warn!(user_id = %identity.user_id, owner = %owner, "ownership check failed");
        return Err(AppError::Forbidden(AccessDenial::AccessDenied));
    }
    Ok(())
}

/// Axum middleware: enforce ownership of the `{userId}` route segment.
///
/// Must be added with `route_layer` inside `require_auth` so path params are
/// available. Routes without path params pass through. Params that cannot be
/// decoded are rejected for everyone but administrators.
pub async fn require_ownership(request: Request, next: Next) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();
    let identity = parts
        .extensions
        .get::<AuthorizedIdentity>()
        .cloned()
        .ok_or(AppError::Unauthorized(AuthFailure::AuthRequired))?;

    match <RawPathParams as FromRequestParts<()>>::from_request_parts(&mut parts, &()).await {
        Ok(params) => {
            if let Some((_, owner)) = params.iter().find(|(name, _)| *name == OWNER_PARAM) {
                check_owner(&identity, owner)?;
            }
        }
        Err(RawPathParamsRejection::MissingPathParams(_)) => {}
        Err(e) => {
            debug!(error = %e, "undecodable path params on owner-scoped route");
            if !identity.is_admin {
                return Err(invalid_owner_id());
            }
        }
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}
