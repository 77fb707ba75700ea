pub mod clock;
pub mod events;
pub mod idempotency;
pub mod identity;
pub mod payment;
pub mod retry;
pub mod table;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{Identity, IdentityProvider};

/// Coarse failure categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Auth,
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Expired,
    CapacityExceeded,
    Network,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("Authentication required: {0}")]
    Auth(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("User {user_id} is not a member of {scope}")]
    NotAMember { scope: String, user_id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{entity} {id} already resolved as {status}")]
    AlreadyResolved {
        entity: &'static str,
        id: String,
        status: String,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{phase} payment already recorded for {member_id} on trip {trip_id}")]
    AlreadyPaid {
        trip_id: Uuid,
        member_id: String,
        phase: String,
    },

    #[error("No recorded upfront payment for {member_id} on trip {trip_id}")]
    UpfrontMissing { trip_id: Uuid, member_id: String },

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("{entity} {id} expired at {expired_at}")]
    Expired {
        entity: &'static str,
        id: String,
        expired_at: DateTime<Utc>,
    },

    #[error("Confirmation window for trip {trip_id} closed at {deadline}")]
    WindowClosed {
        trip_id: Uuid,
        deadline: DateTime<Utc>,
    },

    #[error("{scope} is full ({max_members} members)")]
    CapacityExceeded { scope: String, max_members: u32 },

    #[error("Network error: {0}")]
    Network(String),
}

impl PoolError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::Auth(_) => ErrorKind::Auth,
            PoolError::Validation(_) | PoolError::PaymentDeclined(_) => ErrorKind::Validation,
            PoolError::NotFound { .. } => ErrorKind::NotFound,
            PoolError::Forbidden(_) | PoolError::NotAMember { .. } => ErrorKind::Forbidden,
            PoolError::Conflict(_)
            | PoolError::AlreadyResolved { .. }
            | PoolError::InvalidTransition { .. }
            | PoolError::AlreadyPaid { .. }
            | PoolError::UpfrontMissing { .. } => ErrorKind::Conflict,
            PoolError::Expired { .. } | PoolError::WindowClosed { .. } => ErrorKind::Expired,
            PoolError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            PoolError::Network(_) => ErrorKind::Network,
        }
    }

    /// Only transport failures are worth repeating, and only for reads.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Network
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_errors_map_to_taxonomy() {
        let trip_id = Uuid::new_v4();
        let upfront = PoolError::UpfrontMissing {
            trip_id,
            member_id: "u-1".to_string(),
        };
        assert_eq!(upfront.kind(), ErrorKind::Conflict);

        let window = PoolError::WindowClosed {
            trip_id,
            deadline: Utc::now(),
        };
        assert_eq!(window.kind(), ErrorKind::Expired);

        let member = PoolError::NotAMember {
            scope: "group".to_string(),
            user_id: "u-2".to_string(),
        };
        assert_eq!(member.kind(), ErrorKind::Forbidden);
        assert!(!member.is_transient());
        assert!(PoolError::Network("reset".to_string()).is_transient());
    }

    #[test]
    fn test_not_found_message_names_entity() {
        let err = PoolError::not_found("Invitation", "abc");
        assert_eq!(err.to_string(), "Invitation not found: abc");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
