// handlers/protected/catalog.rs - CRUD for /api/{sensors,domains,tasks,subsections,sections,protocols}
//
// One set of handlers serves every catalog table; the router layers the
// `CatalogEntity` in as an extension.

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    Extension, Json,
};

use super::authorize_owner;
use crate::app::AppState;
use crate::database::models::{CatalogRecord, ChildDetail};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::{CatalogEntity, CatalogInput, DeleteOutcome};

/// GET /api/:entity - All records ordered by name
pub async fn list(
    State(state): State<AppState>,
    Extension(entity): Extension<CatalogEntity>,
) -> ApiResult<Vec<CatalogRecord>> {
    let records = state.catalog().list(entity).await?;
    Ok(ApiResponse::success(records))
}

/// POST /api/:entity - Create a record
///
/// ```json
/// { "name": "Timed Up and Go", "description": "optional" }
/// ```
///
/// Protocols and sections remember the caller as their owner.
pub async fn create(
    State(state): State<AppState>,
    Extension(entity): Extension<CatalogEntity>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CatalogInput>, JsonRejection>,
) -> ApiResult<CatalogRecord> {
    let Json(input) = payload?;
    let owner = entity.is_owned().then_some(user.user_id);
    let record = state.catalog().create(entity, &input, owner).await?;
    Ok(ApiResponse::created(record))
}

/// GET /api/:entity/:id - One record; tasks and subsections include their
/// default sensor/domain ids
pub async fn show(
    State(state): State<AppState>,
    Extension(entity): Extension<CatalogEntity>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<ChildDetail> {
    let Path(id) = id?;
    let detail = state.catalog().detail(entity, id).await?;
    Ok(ApiResponse::success(detail))
}

/// PUT /api/:entity/:id - Replace name and description
pub async fn update(
    State(state): State<AppState>,
    Extension(entity): Extension<CatalogEntity>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CatalogInput>, JsonRejection>,
) -> ApiResult<CatalogRecord> {
    let Path(id) = id?;
    let Json(input) = payload?;
    authorize_owner(&state, &user, entity, id).await?;

    let record = state.catalog().update(entity, id, &input).await?;
    Ok(ApiResponse::success(record))
}

/// DELETE /api/:entity/:id
///
/// Deleting a task, subsection or section compacts the ordering of every
/// parent it belonged to.
pub async fn delete(
    State(state): State<AppState>,
    Extension(entity): Extension<CatalogEntity>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<DeleteOutcome> {
    let Path(id) = id?;
    authorize_owner(&state, &user, entity, id).await?;

    let outcome = state.catalog().delete(entity, id).await?;
    Ok(ApiResponse::success(outcome))
}
