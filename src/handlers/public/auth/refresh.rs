// handlers/public/auth/refresh.rs - POST /auth/refresh handler

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::TokenPair;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /auth/refresh - Trade a refresh token for a new token pair
///
/// The presented refresh token is consumed; replaying it answers 401.
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<TokenPair> {
    let Json(payload) = payload?;
    let pair = state.auth().refresh(&payload.refresh_token).await?;
    Ok(ApiResponse::success(pair))
}
