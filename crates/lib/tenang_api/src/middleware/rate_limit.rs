//! Admission middleware: per-client, per-endpoint-class quotas.
//!
//! Runs before authentication. A client is counted as its user id when an
//! `AuthorizedIdentity` is already attached to the request, and as IP plus
//! truncated user agent otherwise.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header::USER_AGENT},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tenang_core::admission::{Admitted, ClientKey, Decision};
use tracing::warn;

use crate::AppState;
use crate::error::{AppError, RateLimited};
use crate::middleware::auth::AuthorizedIdentity;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_RATELIMIT_WINDOW: HeaderName = HeaderName::from_static("x-ratelimit-window");

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Best-effort client address.
///
/// Proxy headers are consulted only when `trust_proxy_headers` is set;
/// otherwise they are caller-controlled and would let a client pick its own key.
pub fn client_ip(request: &Request, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        let forwarded = header_str(request.headers(), &X_FORWARDED_FOR)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let real_ip = header_str(request.headers(), &X_REAL_IP)
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded.or(real_ip) {
            return ip.to_string();
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn user_agent(request: &Request) -> &str {
    header_str(request.headers(), &USER_AGENT).unwrap_or("")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Key the request is counted against.
pub fn client_key(request: &Request, trust_proxy_headers: bool) -> ClientKey {
    match request.extensions().get::<AuthorizedIdentity>() {
        Some(identity) => ClientKey::User(identity.user_id),
        None => ClientKey::anonymous(
            client_ip(request, trust_proxy_headers),
            user_agent(request),
        ),
    }
}

fn apply_headers(headers: &mut HeaderMap, admitted: &Admitted) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(admitted.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(admitted.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(admitted.reset_at.timestamp()),
    );
    headers.insert(
        X_RATELIMIT_WINDOW,
        HeaderValue::from(admitted.window.num_seconds()),
    );
}

/// Axum middleware: classify the route, count the request, reject with 429
/// when the client's quota for that class is spent.
pub async fn admit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_key(&request, state.config.trust_proxy_headers);

    match state.limiter.check(request.uri().path(), &client) {
        Decision::Allowed(admitted) => {
            let mut response = next.run(request).await;
            apply_headers(response.headers_mut(), &admitted);
            Ok(response)
        }
        Decision::Denied(denied) => {
            let retry_after = denied.retry_after_secs(Utc::now());
            warn!(
                client = %client,
                class = %denied.class,
                limit = denied.limit,
                retry_after,
                "rate limit exceeded"
            );
            Err(AppError::RateLimited(Box::new(RateLimited {
                denied,
                retry_after,
            })))
        }
    }
}
