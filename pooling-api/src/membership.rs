use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use pooling_core::Identity;
use pooling_membership::{Invitation, JoinRequest, JoinRequestView, PendingItems};
use uuid::Uuid;

use crate::error::FacadeError;
use crate::idempotency_key;
use crate::requests::{InviteBody, JoinBody, JoinVoteBody, PendingItemsQuery, RespondInvitationBody, UserQuery};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/groups/all-pending-items", get(all_pending_items))
        .route("/groups/invitations/respond", post(respond_to_invitation))
        .route("/groups/invitations/{user_id}", get(list_invitations))
        .route("/groups/{group_id}/join", post(request_join))
        .route("/groups/{group_id}/invite", post(invite))
        .route("/groups/{group_id}/join-requests/pending", get(pending_join_requests))
        .route(
            "/groups/{group_id}/join-requests/{requester_id}/vote",
            post(vote_on_join_request),
        )
}

async fn request_join(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Path(group_id): Path<Uuid>,
    Json(body): Json<JoinBody>,
) -> Result<(StatusCode, Json<JoinRequest>), FacadeError> {
    let request = state
        .facade
        .request_join(&caller, idempotency_key(&headers), group_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn vote_on_join_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Path((group_id, requester_id)): Path<(Uuid, String)>,
    Json(body): Json<JoinVoteBody>,
) -> Result<Json<JoinRequest>, FacadeError> {
    let request = state
        .facade
        .vote_on_join_request(&caller, idempotency_key(&headers), group_id, &requester_id, body)
        .await?;
    Ok(Json(request))
}

async fn pending_join_requests(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<JoinRequestView>>, FacadeError> {
    let pending = state
        .facade
        .pending_join_requests(&caller, query.user_id.as_deref(), group_id)
        .await?;
    Ok(Json(pending))
}

async fn all_pending_items(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Query(query): Query<PendingItemsQuery>,
) -> Result<Json<PendingItems>, FacadeError> {
    Ok(Json(state.facade.all_pending_items(&caller, query).await?))
}

async fn list_invitations(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Invitation>>, FacadeError> {
    Ok(Json(state.facade.list_invitations(&caller, &user_id).await?))
}

async fn respond_to_invitation(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Json(body): Json<RespondInvitationBody>,
) -> Result<Json<Invitation>, FacadeError> {
    let invitation = state
        .facade
        .respond_to_invitation(&caller, idempotency_key(&headers), body)
        .await?;
    Ok(Json(invitation))
}

async fn invite(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Path(group_id): Path<Uuid>,
    Json(body): Json<InviteBody>,
) -> Result<(StatusCode, Json<Invitation>), FacadeError> {
    let invitation = state
        .facade
        .invite(&caller, idempotency_key(&headers), group_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}
