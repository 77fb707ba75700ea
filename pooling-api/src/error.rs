use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pooling_core::{ErrorKind, PoolError};
use serde_json::json;

/// A failed facade call: which operation failed and why.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed: {source}")]
pub struct FacadeError {
    pub operation: &'static str,
    #[source]
    pub source: PoolError,
}

pub type FacadeResult<T> = Result<T, FacadeError>;

impl FacadeError {
    pub fn new(operation: &'static str, source: PoolError) -> Self {
        Self { operation, source }
    }

    /// For `map_err` chains: `.map_err(FacadeError::during("vote"))`.
    pub fn during(operation: &'static str) -> impl FnOnce(PoolError) -> Self {
        move |source| Self::new(operation, source)
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict | ErrorKind::CapacityExceeded => StatusCode::CONFLICT,
            ErrorKind::Expired => StatusCode::GONE,
            ErrorKind::Network => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for FacadeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }

        let body = Json(json!({
            "error": self.source.to_string(),
            "kind": self.kind(),
            "operation": self.operation,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_kinds_map_to_statuses() {
        let cases = [
            (PoolError::Auth("no token".to_string()), StatusCode::UNAUTHORIZED),
            (PoolError::PaymentDeclined("card".to_string()), StatusCode::BAD_REQUEST),
            (PoolError::not_found("Group", Uuid::nil()), StatusCode::NOT_FOUND),
            (
                PoolError::NotAMember {
                    scope: "group x".to_string(),
                    user_id: "eve".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                PoolError::UpfrontMissing {
                    trip_id: Uuid::nil(),
                    member_id: "bob".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                PoolError::CapacityExceeded {
                    scope: "group x".to_string(),
                    max_members: 4,
                },
                StatusCode::CONFLICT,
            ),
            (PoolError::Network("reset".to_string()), StatusCode::BAD_GATEWAY),
        ];

        for (source, status) in cases {
            assert_eq!(FacadeError::new("test", source).status(), status);
        }
    }

    #[test]
    fn test_message_names_operation() {
        let err = FacadeError::new("pay_upfront", PoolError::Validation("amount".to_string()));
        assert_eq!(err.to_string(), "pay_upfront failed: Validation failed: amount");
    }
}
