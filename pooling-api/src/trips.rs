use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use pooling_core::Identity;
use pooling_trip::{Cancellation, ConfirmedTrip, Payment, PaymentPhase, TripDetails, TripStatusView};
use uuid::Uuid;

use crate::error::FacadeError;
use crate::idempotency_key;
use crate::requests::{DecisionBody, InitiateBody, MemberBody, PaymentBody, ReasonBody, UserQuery};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pooling-confirm/initiate", post(initiate))
        .route("/pooling-confirm/{trip_id}/confirm", post(confirm))
        .route("/pooling-confirm/{trip_id}/status", get(status))
        .route("/pooling-confirm/{trip_id}/details", get(details))
        .route("/pooling-confirm/{trip_id}/cancel", post(cancel))
        .route("/pooling-confirm/{trip_id}/payment/upfront", post(pay_upfront))
        .route("/pooling-confirm/{trip_id}/payment/final", post(pay_final))
        .route("/pooling-confirm/{trip_id}/vote", post(vote_on_decision))
        .route("/pooling-confirm/{trip_id}/cancel-participation", post(cancel_participation))
}

async fn initiate(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Json(body): Json<InitiateBody>,
) -> Result<(StatusCode, Json<ConfirmedTrip>), FacadeError> {
    let trip = state
        .facade
        .initiate_confirmation(&caller, idempotency_key(&headers), body)
        .await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn confirm(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Path(trip_id): Path<Uuid>,
    Json(body): Json<MemberBody>,
) -> Result<Json<ConfirmedTrip>, FacadeError> {
    let trip = state
        .facade
        .confirm_participation(&caller, idempotency_key(&headers), trip_id, body.user_id.as_deref())
        .await?;
    Ok(Json(trip))
}

async fn status(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Path(trip_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<TripStatusView>, FacadeError> {
    let view = state
        .facade
        .confirmation_status(&caller, query.user_id.as_deref(), trip_id)
        .await?;
    Ok(Json(view))
}

async fn details(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Path(trip_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<TripDetails>, FacadeError> {
    let details = state
        .facade
        .confirmation_details(&caller, query.user_id.as_deref(), trip_id)
        .await?;
    Ok(Json(details))
}

async fn cancel(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Path(trip_id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<ConfirmedTrip>, FacadeError> {
    let trip = state
        .facade
        .cancel_confirmation(&caller, idempotency_key(&headers), trip_id, body)
        .await?;
    Ok(Json(trip))
}

async fn pay_upfront(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Path(trip_id): Path<Uuid>,
    Json(body): Json<PaymentBody>,
) -> Result<(StatusCode, Json<Payment>), FacadeError> {
    let payment = state
        .facade
        .pay(&caller, idempotency_key(&headers), trip_id, PaymentPhase::Upfront, body)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

async fn pay_final(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Path(trip_id): Path<Uuid>,
    Json(body): Json<PaymentBody>,
) -> Result<(StatusCode, Json<Payment>), FacadeError> {
    let payment = state
        .facade
        .pay(&caller, idempotency_key(&headers), trip_id, PaymentPhase::Final, body)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

async fn vote_on_decision(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Path(trip_id): Path<Uuid>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<ConfirmedTrip>, FacadeError> {
    let trip = state
        .facade
        .vote_on_decision(&caller, idempotency_key(&headers), trip_id, body)
        .await?;
    Ok(Json(trip))
}

async fn cancel_participation(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    headers: HeaderMap,
    Path(trip_id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<Cancellation>, FacadeError> {
    let cancellation = state
        .facade
        .cancel_participation(&caller, idempotency_key(&headers), trip_id, body)
        .await?;
    Ok(Json(cancellation))
}
