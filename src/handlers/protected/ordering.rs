// handlers/protected/ordering.rs - Ordered memberships of protocols and sections
//
// Routes (one set per relation, the `Relation` is layered in as an extension):
//   GET    /api/protocols/:id/tasks              list in order
//   POST   /api/protocols/:id/tasks              insert at position
//   PUT    /api/protocols/:id/tasks              bulk reorder (exhaustive)
//   PATCH  /api/protocols/:id/tasks/:child_id    move
//   PUT    /api/protocols/:id/tasks/:child_id    rating / notes
//   DELETE /api/protocols/:id/tasks/:child_id    remove
// and the same under /api/sections/:id/subsections and /api/protocols/:id/sections.

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::pool::PoolConnection;
use sqlx::Sqlite;

use super::authorize_owner;
use crate::app::AppState;
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::ordering::{
    InsertOptions, InsertOutcome, Membership, MembershipDetails, MoveOutcome, OrderingEngine,
    Relation, RemoveOutcome, ReorderAssignment,
};
use crate::services::CatalogEntity;

#[derive(Debug, Deserialize)]
pub struct InsertRequest {
    pub child_id: i64,
    /// 1-based target slot; omitted appends
    pub position: Option<i64>,
    #[serde(default = "default_copy")]
    pub copy_default_associations: bool,
}

fn default_copy() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub position: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub assignments: Vec<ReorderAssignment>,
}

#[derive(Debug, Deserialize)]
pub struct ResequenceRequest {
    pub relation: String,
    pub parent_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ResequenceResponse {
    pub relation: Relation,
    pub parent_id: i64,
    pub updated: u64,
}

/// Caller must own the parent (or be an admin) before any ordering change
async fn authorize_parent(
    state: &AppState,
    user: &AuthUser,
    relation: Relation,
    parent_id: i64,
) -> Result<(), ApiError> {
    authorize_owner(state, user, CatalogEntity::parent_of(relation), parent_id).await
}

async fn connection(state: &AppState) -> Result<PoolConnection<Sqlite>, ApiError> {
    Ok(state.pool.acquire().await.map_err(DatabaseError::from)?)
}

/// GET - Memberships of a parent in order
pub async fn list(
    State(state): State<AppState>,
    Extension(relation): Extension<Relation>,
    parent_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Vec<Membership>> {
    let Path(parent_id) = parent_id?;
    // NotFound for a missing parent rather than an empty list
    state
        .catalog()
        .get(CatalogEntity::parent_of(relation), parent_id)
        .await?;

    let mut conn = connection(&state).await?;
    let memberships = OrderingEngine::new(relation)
        .list_memberships(&mut conn, parent_id)
        .await?;
    Ok(ApiResponse::success(memberships))
}

/// POST - Attach a child at a position
///
/// ```json
/// { "child_id": 12, "position": 1, "copy_default_associations": true }
/// ```
pub async fn insert(
    State(state): State<AppState>,
    Extension(relation): Extension<Relation>,
    Extension(user): Extension<AuthUser>,
    parent_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<InsertRequest>, JsonRejection>,
) -> ApiResult<InsertOutcome> {
    let Path(parent_id) = parent_id?;
    let Json(request) = payload?;
    authorize_parent(&state, &user, relation, parent_id).await?;

    let mut conn = connection(&state).await?;
    let outcome = OrderingEngine::new(relation)
        .insert_at_position(
            &mut conn,
            parent_id,
            request.child_id,
            request.position,
            InsertOptions {
                copy_default_associations: request.copy_default_associations,
            },
        )
        .await?;
    Ok(ApiResponse::created(outcome))
}

/// PUT - Replace the complete ordering
///
/// ```json
/// { "assignments": [ { "child_id": 4, "order_index": 1 }, { "child_id": 9, "order_index": 2 } ] }
/// ```
///
/// Every member must appear exactly once with indices `1..=N`; partial
/// reorders are refused with 409.
pub async fn reorder(
    State(state): State<AppState>,
    Extension(relation): Extension<Relation>,
    Extension(user): Extension<AuthUser>,
    parent_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ReorderRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Path(parent_id) = parent_id?;
    let Json(request) = payload?;
    authorize_parent(&state, &user, relation, parent_id).await?;

    let mut conn = connection(&state).await?;
    let updated = OrderingEngine::new(relation)
        .bulk_reorder(&mut conn, parent_id, &request.assignments)
        .await?;
    Ok(ApiResponse::success(json!({ "updated": updated })))
}

/// PATCH /:child_id - Move to `{ "position": n }`
pub async fn move_position(
    State(state): State<AppState>,
    Extension(relation): Extension<Relation>,
    Extension(user): Extension<AuthUser>,
    ids: Result<Path<(i64, i64)>, PathRejection>,
    payload: Result<Json<MoveRequest>, JsonRejection>,
) -> ApiResult<MoveOutcome> {
    let Path((parent_id, child_id)) = ids?;
    let Json(request) = payload?;
    authorize_parent(&state, &user, relation, parent_id).await?;

    let mut conn = connection(&state).await?;
    let outcome = OrderingEngine::new(relation)
        .move_position(&mut conn, parent_id, child_id, request.position)
        .await?;
    Ok(ApiResponse::success(outcome))
}

/// PUT /:child_id - Per-membership rating and notes
pub async fn update_details(
    State(state): State<AppState>,
    Extension(relation): Extension<Relation>,
    Extension(user): Extension<AuthUser>,
    ids: Result<Path<(i64, i64)>, PathRejection>,
    payload: Result<Json<MembershipDetails>, JsonRejection>,
) -> ApiResult<Membership> {
    let Path((parent_id, child_id)) = ids?;
    let Json(details) = payload?;
    authorize_parent(&state, &user, relation, parent_id).await?;

    let mut conn = connection(&state).await?;
    let membership = OrderingEngine::new(relation)
        .update_membership_details(&mut conn, parent_id, child_id, &details)
        .await?;
    Ok(ApiResponse::success(membership))
}

/// DELETE /:child_id - Detach and close the gap
pub async fn remove(
    State(state): State<AppState>,
    Extension(relation): Extension<Relation>,
    Extension(user): Extension<AuthUser>,
    ids: Result<Path<(i64, i64)>, PathRejection>,
) -> ApiResult<RemoveOutcome> {
    let Path((parent_id, child_id)) = ids?;
    authorize_parent(&state, &user, relation, parent_id).await?;

    let mut conn = connection(&state).await?;
    let outcome = OrderingEngine::new(relation)
        .remove_membership(&mut conn, parent_id, child_id)
        .await?;
    Ok(ApiResponse::success(outcome))
}

/// POST /api/resequence - Repair a parent's ordering
///
/// ```json
/// { "relation": "protocol-tasks", "parent_id": 3 }
/// ```
pub async fn resequence(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<ResequenceRequest>, JsonRejection>,
) -> ApiResult<ResequenceResponse> {
    let Json(request) = payload?;
    let relation: Relation = request
        .relation
        .parse()
        .map_err(|e: String| ApiError::field_error("relation", e))?;
    authorize_parent(&state, &user, relation, request.parent_id).await?;

    let mut conn = connection(&state).await?;
    let updated = OrderingEngine::new(relation)
        .resequence(&mut conn, request.parent_id)
        .await?;
    Ok(ApiResponse::success(ResequenceResponse {
        relation,
        parent_id: request.parent_id,
        updated,
    }))
}
