// handlers/public/auth/login.rs - POST /auth/login handler

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::TokenPair;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/**
 * POST /auth/login - Authenticate user and receive tokens
 *
 * Expected Input:
 * ```json
 * { "username": "alice", "password": "secret123" }
 * ```
 *
 * Expected Output (Success):
 * ```json
 * {
 *   "success": true,
 *   "data": {
 *     "access_token": "eyJhbGciOiJIUzI1NiI...",
 *     "refresh_token": "5f0c...",
 *     "token_type": "Bearer",
 *     "expires_in": 604800,
 *     "user": { "id": 1, "username": "alice", "role": "user", ... }
 *   }
 * }
 * ```
 *
 * Unknown users and wrong passwords both answer 401 with the same message.
 */
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<TokenPair> {
    let Json(payload) = payload?;
    let pair = state.auth().login(&payload.username, &payload.password).await?;
    Ok(ApiResponse::success(pair))
}
