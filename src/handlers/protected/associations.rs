// handlers/protected/associations.rs - Sensor/domain associations
//
// Child-level defaults:    GET|PUT /api/tasks/:id/sensors, /api/tasks/:id/domains,
//                                  /api/subsections/:id/sensors
// Membership overrides:    GET|PUT /api/memberships/:relation/:membership_id/:kind

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::authorize_owner;
use crate::app::AppState;
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::ordering::associations::{list_membership_associations, replace_membership_associations};
use crate::ordering::{AssociationKind, Membership, OrderingEngine, Relation};
use crate::services::CatalogEntity;

#[derive(Debug, Deserialize)]
pub struct AssociationIds {
    pub ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct MembershipAssociations {
    pub relation: Relation,
    pub membership_id: i64,
    pub kind: AssociationKind,
    pub ids: Vec<i64>,
}

/// GET /api/{tasks,subsections}/:id/{sensors,domains}
pub async fn list_defaults(
    State(state): State<AppState>,
    Extension(kind): Extension<AssociationKind>,
    child_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Vec<i64>> {
    let Path(child_id) = child_id?;
    let ids = state.catalog().default_associations(kind, child_id).await?;
    Ok(ApiResponse::success(ids))
}

/// PUT /api/{tasks,subsections}/:id/{sensors,domains} - `{ "ids": [1, 2] }`
///
/// Only memberships created afterwards copy the new defaults.
pub async fn replace_defaults(
    State(state): State<AppState>,
    Extension(kind): Extension<AssociationKind>,
    child_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<AssociationIds>, JsonRejection>,
) -> ApiResult<Vec<i64>> {
    let Path(child_id) = child_id?;
    let Json(payload) = payload?;
    let ids = state
        .catalog()
        .set_default_associations(kind, child_id, &payload.ids)
        .await?;
    Ok(ApiResponse::success(ids))
}

/// GET /api/memberships/:relation/:membership_id/:kind
pub async fn list_membership(
    State(state): State<AppState>,
    params: Result<Path<(String, i64, String)>, PathRejection>,
) -> ApiResult<MembershipAssociations> {
    let Path((relation, membership_id, kind)) = params?;
    let (relation, kind) = resolve(&relation, &kind)?;

    let mut conn = state.pool.acquire().await.map_err(DatabaseError::from)?;
    let ids = list_membership_associations(&mut conn, kind, membership_id).await?;
    Ok(ApiResponse::success(MembershipAssociations {
        relation,
        membership_id,
        kind,
        ids,
    }))
}

/// PUT /api/memberships/:relation/:membership_id/:kind - `{ "ids": [1, 2] }`
///
/// Overrides what was copied from the child's defaults for this one membership.
pub async fn replace_membership(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    params: Result<Path<(String, i64, String)>, PathRejection>,
    payload: Result<Json<AssociationIds>, JsonRejection>,
) -> ApiResult<MembershipAssociations> {
    let Path((relation, membership_id, kind)) = params?;
    let Json(payload) = payload?;
    let (relation, kind) = resolve(&relation, &kind)?;

    let membership = find_membership(&state, relation, membership_id).await?;
    authorize_owner(&state, &user, CatalogEntity::parent_of(relation), membership.parent_id).await?;

    let mut conn = state.pool.acquire().await.map_err(DatabaseError::from)?;
    let ids = replace_membership_associations(&mut conn, kind, membership_id, &payload.ids).await?;
    Ok(ApiResponse::success(MembershipAssociations {
        relation,
        membership_id,
        kind,
        ids,
    }))
}

fn resolve(relation: &str, kind: &str) -> Result<(Relation, AssociationKind), ApiError> {
    let relation: Relation = relation
        .parse()
        .map_err(|e: String| ApiError::not_found(e))?;
    let kind = AssociationKind::for_relation(relation, kind).ok_or_else(|| {
        ApiError::not_found(format!("Relation {} has no '{}' associations", relation, kind))
    })?;
    Ok((relation, kind))
}

async fn find_membership(
    state: &AppState,
    relation: Relation,
    membership_id: i64,
) -> Result<Membership, ApiError> {
    let mut conn = state.pool.acquire().await.map_err(DatabaseError::from)?;
    OrderingEngine::new(relation)
        .membership_by_id(&mut conn, membership_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("membership {} not found", membership_id)))
}
