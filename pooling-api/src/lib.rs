use axum::{
    http::{HeaderMap, HeaderName, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod facade;
pub mod groups;
pub mod membership;
pub mod middleware;
pub mod requests;
pub mod state;
pub mod trips;
pub mod worker;

pub use facade::PoolFacade;
pub use state::{AppState, AuthConfig};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

pub(crate) fn idempotency_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
            HeaderName::from_static(IDEMPOTENCY_KEY_HEADER),
        ]);

    Router::new()
        .merge(groups::routes())
        .merge(membership::routes())
        .merge(trips::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::identity_middleware,
        ))
        .route("/health", get(|| async { "ok" }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
