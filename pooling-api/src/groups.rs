use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use pooling_catalog::{CompatibleGroup, Group, GroupSummary, Page, SavedTripOutcome};
use pooling_core::Identity;
use uuid::Uuid;

use crate::error::FacadeError;
use crate::idempotency_key;
use crate::requests::{CreateGroupBody, EnhancedGroupsQuery, FinalizeBody, PrecheckBody, SaveTripBody};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/groups/public/enhanced", get(list_enhanced))
        .route("/groups/with-trip", post(create_with_trip))
        .route("/groups/created-by/{user_id}", get(created_by))
        .route("/public-pooling/pre-check", post(precheck))
        .route("/public-pooling/groups/{group_id}/save-trip", post(save_trip))
        .route("/public-pooling/groups/{group_id}/finalize", post(finalize))
}

async fn list_enhanced(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Query(query): Query<EnhancedGroupsQuery>,
) -> Result<Json<Page<GroupSummary>>, FacadeError> {
    Ok(Json(state.facade.list_enhanced_groups(&caller, query).await?))
}

async fn create_with_trip(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Json(body): Json<CreateGroupBody>,
) -> Result<(StatusCode, Json<Group>), FacadeError> {
    let group = state
        .facade
        .create_group_with_trip(&caller, idempotency_key(&headers), body)
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn created_by(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<GroupSummary>>, FacadeError> {
    Ok(Json(state.facade.groups_created_by(&caller, &user_id).await?))
}

async fn precheck(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Json(body): Json<PrecheckBody>,
) -> Result<Json<Vec<CompatibleGroup>>, FacadeError> {
    Ok(Json(state.facade.precheck(&caller, body).await?))
}

async fn save_trip(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Path(group_id): Path<Uuid>,
    Json(body): Json<SaveTripBody>,
) -> Result<Json<SavedTripOutcome>, FacadeError> {
    let outcome = state
        .facade
        .save_trip(&caller, idempotency_key(&headers), group_id, body)
        .await?;
    Ok(Json(outcome))
}

async fn finalize(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Path(group_id): Path<Uuid>,
    Json(body): Json<FinalizeBody>,
) -> Result<Json<Group>, FacadeError> {
    let group = state
        .facade
        .finalize_group(&caller, idempotency_key(&headers), group_id, body)
        .await?;
    Ok(Json(group))
}
