// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Every route here sits behind `jwt_auth_middleware`, which injects `AuthUser`.
// Reads are open to any authenticated user; changes to a protocol or section
// (including its ordering) require ownership or the admin role.

pub mod associations;
pub mod auth;
pub mod catalog;
pub mod ordering;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::services::CatalogEntity;

/// NotFound if the record is missing, Forbidden unless the caller created it or
/// is an admin. Unowned entities are open to every authenticated user.
pub(crate) async fn authorize_owner(
    state: &AppState,
    user: &AuthUser,
    entity: CatalogEntity,
    id: i64,
) -> Result<(), ApiError> {
    if !entity.is_owned() {
        return Ok(());
    }

    let record = state.catalog().get(entity, id).await?;
    if !user.can_modify(record.created_by) {
        tracing::info!(
            "User {} denied write access to {} {} owned by {:?}",
            user.username,
            entity,
            id,
            record.created_by
        );
        return Err(ApiError::forbidden(format!(
            "Only the owner or an admin can modify {} {}",
            entity, id
        )));
    }
    Ok(())
}
