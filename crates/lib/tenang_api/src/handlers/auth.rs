//! Authentication request handlers.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{LogoutResponse, RefreshRequest, TokenResponse};

/// `POST /api/v1/auth/refresh`: exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let tokens = state
        .tokens
        .rotate(state.users.as_ref(), &body.refresh_token)
        .await?;
    Ok(Json(TokenResponse {
        message: "Tokens refreshed successfully".into(),
        tokens,
    }))
}

/// `POST /api/v1/auth/logout`: acknowledge; tokens are discarded client-side.
pub async fn logout_handler() -> Json<LogoutResponse> {
    Json(LogoutResponse {
        message: "Logout successful. Please clear tokens on the client.".into(),
    })
}
