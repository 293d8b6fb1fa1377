// handlers/public/auth/register.rs - POST /auth/register handler

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;

use crate::app::AppState;
use crate::database::models::User;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// POST /auth/register - Create a plain user account
///
/// Disabled (403) when `security.allow_registration` is off; operators then
/// provision accounts with `protocol-admin create-user`.
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<User> {
    let Json(payload) = payload?;
    let user = state.auth().register(&payload.username, &payload.password).await?;
    Ok(ApiResponse::created(user))
}
