//! # tenang_api
//!
//! HTTP admission layer for Tenang. Every request is counted by the admission
//! limiter first, then authenticated and authorized per route group.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use tenang_core::admission::AdmissionLimiter;
use tenang_core::auth::store::UserStore;
use tenang_core::auth::tokens::TokenService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{admin, auth, public, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub tokens: Arc<TokenService>,
    /// Owned by the server; its sweep is started and stopped alongside it.
    pub limiter: Arc<AdmissionLimiter>,
    pub users: Arc<dyn UserStore>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        limiter: Arc<AdmissionLimiter>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(config.tokens.clone()));
        Self {
            config,
            tokens,
            limiter,
            users,
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::GET_HEALTH, get(public::health_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler));

    // Personalised when a valid token is presented
    let optional = Router::new()
        .route(routes::GET_API_FEED, get(public::feed_handler))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth::optional_auth,
        ));

    // Protected routes scoped to the `{userId}` owner
    let owned = Router::new()
        .route(routes::GET_USERS_USER_ID_SESSION, get(users::session_handler))
        .route_layer(from_fn(middleware::auth::require_ownership))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // Admin-only routes
    let admin = Router::new()
        .route(routes::GET_ADMIN_RATE_LIMITS, get(admin::rate_limits_handler))
        .route_layer(from_fn(middleware::auth::require_admin))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // Admission wraps the auth layers, so quotas are keyed by client IP and
    // user agent here, never by user id.
    Router::new()
        .merge(public)
        .merge(optional)
        .merge(owned)
        .merge(admin)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::admit,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
