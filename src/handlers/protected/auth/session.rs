use axum::{extract::State, Extension};
use serde::Serialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    #[serde(flatten)]
    pub user: User,
    pub is_admin: bool,
}

/// GET /api/auth/whoami - Current authenticated user details
pub async fn whoami(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<WhoamiResponse> {
    let user = state
        .auth()
        .find_user(auth_user.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    Ok(ApiResponse::success(WhoamiResponse {
        is_admin: auth_user.is_admin(),
        user,
    }))
}

/// DELETE /api/auth/session - Revoke every refresh token of the caller
///
/// Access tokens already issued stay valid until they expire.
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Value> {
    let revoked = state.auth().logout(auth_user.user_id).await?;
    Ok(ApiResponse::success(json!({ "revoked_refresh_tokens": revoked })))
}
