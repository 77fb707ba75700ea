use chrono::{DateTime, Duration, Utc};
use pooling_core::{Identity, PoolError, PoolResult};
use pooling_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InviteResponse {
    Accept,
    Reject,
}

impl std::str::FromStr for InviteResponse {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accept" => Ok(InviteResponse::Accept),
            "reject" | "decline" => Ok(InviteResponse::Reject),
            other => Err(PoolError::Validation(format!("unknown invitation action: {}", other))),
        }
    }
}

/// Who an invitation is addressed to: a known user or an email address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InvitationTarget {
    #[serde(rename_all = "camelCase")]
    User { user_id: String },
    Email { email: Masked<String> },
}

impl InvitationTarget {
    /// Build a target from the optional request fields; exactly one is needed.
    pub fn from_parts(user_id: Option<String>, email: Option<String>) -> PoolResult<Self> {
        let user_id = user_id.filter(|u| !u.trim().is_empty());
        let email = email.filter(|e| !e.trim().is_empty());
        match (user_id, email) {
            (Some(user_id), None) => Ok(InvitationTarget::User { user_id }),
            (None, Some(email)) => {
                if !email.contains('@') {
                    return Err(PoolError::Validation("invited email is malformed".to_string()));
                }
                Ok(InvitationTarget::Email {
                    email: Masked::new(email.trim().to_string()),
                })
            }
            (Some(_), Some(_)) => Err(PoolError::Validation(
                "invite either a user id or an email, not both".to_string(),
            )),
            (None, None) => Err(PoolError::Validation(
                "an invited user id or email is required".to_string(),
            )),
        }
    }

    pub fn matches(&self, identity: &Identity) -> bool {
        match self {
            InvitationTarget::User { user_id } => *user_id == identity.user_id,
            InvitationTarget::Email { email } => email.matches_email(identity.email.expose()),
        }
    }
}

/// Longest validity an inviter may ask for.
pub const MAX_EXPIRATION_DAYS: u32 = 365;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: Uuid,
    pub group_id: Uuid,
    pub inviter_id: String,
    pub target: InvitationTarget,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: InvitationStatus,
    pub responded_at: Option<DateTime<Utc>>,
    pub response_message: Option<String>,
    /// Who actually responded, resolved from their identity.
    pub responder_id: Option<String>,
    /// Accepted, but the roster filled up before the invitee was added.
    pub unfulfilled: bool,
}

impl Invitation {
    pub fn new(
        group_id: Uuid,
        inviter_id: String,
        target: InvitationTarget,
        message: Option<String>,
        expiration_days: u32,
        now: DateTime<Utc>,
    ) -> PoolResult<Self> {
        if expiration_days == 0 || expiration_days > MAX_EXPIRATION_DAYS {
            return Err(PoolError::Validation(format!(
                "invitation validity must be between 1 and {} days",
                MAX_EXPIRATION_DAYS
            )));
        }
        let expires_at = now
            .checked_add_signed(Duration::days(i64::from(expiration_days)))
            .ok_or_else(|| PoolError::Validation("invitation expiry out of range".to_string()))?;
        Ok(Self {
            id: Uuid::new_v4(),
            group_id,
            inviter_id,
            target,
            message,
            created_at: now,
            expires_at,
            status: InvitationStatus::Pending,
            responded_at: None,
            response_message: None,
            responder_id: None,
            unfulfilled: false,
        })
    }

    /// Status as observed at `now`; a pending invitation past its expiry
    /// reads as Expired whether or not that was ever stored.
    pub fn status_at(&self, now: DateTime<Utc>) -> InvitationStatus {
        if self.status == InvitationStatus::Pending && now > self.expires_at {
            InvitationStatus::Expired
        } else {
            self.status
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == InvitationStatus::Pending
    }

    pub fn addressed_to(&self, identity: &Identity) -> bool {
        self.target.matches(identity)
    }

    /// Copy of the record with its status as observed at `now`.
    pub fn observed_at(&self, now: DateTime<Utc>) -> Self {
        let mut observed = self.clone();
        observed.status = self.status_at(now);
        observed
    }

    fn respond(
        &mut self,
        responder_id: String,
        response: InviteResponse,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> PoolResult<()> {
        if now > self.expires_at {
            return Err(PoolError::Expired {
                entity: "Invitation",
                id: self.id.to_string(),
                expired_at: self.expires_at,
            });
        }
        if self.status != InvitationStatus::Pending {
            return Err(PoolError::AlreadyResolved {
                entity: "Invitation",
                id: self.id.to_string(),
                status: format!("{:?}", self.status),
            });
        }

        self.status = match response {
            InviteResponse::Accept => InvitationStatus::Accepted,
            InviteResponse::Reject => InvitationStatus::Rejected,
        };
        self.responded_at = Some(now);
        self.response_message = message;
        self.responder_id = Some(responder_id);
        Ok(())
    }

    /// Pending → Expired, for sweeps.
    fn expire(&mut self, now: DateTime<Utc>) -> PoolResult<()> {
        if self.status_at(now) != InvitationStatus::Expired || self.status == InvitationStatus::Expired {
            return Err(PoolError::InvalidTransition {
                from: format!("{:?}", self.status),
                to: "EXPIRED".to_string(),
            });
        }
        self.status = InvitationStatus::Expired;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum InvitationChange {
    Respond {
        responder_id: String,
        response: InviteResponse,
        message: Option<String>,
    },
    Expire,
    MarkUnfulfilled,
}

impl InvitationChange {
    pub fn apply_to(self, invitation: &mut Invitation, now: DateTime<Utc>) -> PoolResult<()> {
        match self {
            InvitationChange::Respond {
                responder_id,
                response,
                message,
            } => invitation.respond(responder_id, response, message, now),
            InvitationChange::Expire => invitation.expire(now),
            InvitationChange::MarkUnfulfilled => {
                invitation.unfulfilled = true;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pooling_core::ErrorKind;

    fn invitation(now: DateTime<Utc>) -> Invitation {
        Invitation::new(
            Uuid::new_v4(),
            "ana".to_string(),
            InvitationTarget::User {
                user_id: "bob".to_string(),
            },
            None,
            7,
            now,
        )
        .unwrap()
    }

    fn respond(inv: &mut Invitation, response: InviteResponse, at: DateTime<Utc>) -> PoolResult<()> {
        InvitationChange::Respond {
            responder_id: "bob".to_string(),
            response,
            message: None,
        }
        .apply_to(inv, at)
    }

    #[test]
    fn test_response_after_expiry_always_fails() {
        let now = Utc::now();
        for response in [InviteResponse::Accept, InviteResponse::Reject] {
            let mut inv = invitation(now);
            let err = respond(&mut inv, response, now + Duration::days(8)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Expired);
            assert_eq!(inv.status, InvitationStatus::Pending);
            assert_eq!(inv.status_at(now + Duration::days(8)), InvitationStatus::Expired);
        }
    }

    #[test]
    fn test_response_on_last_valid_instant() {
        let now = Utc::now();
        let mut inv = invitation(now);
        let last_valid = inv.expires_at;
        respond(&mut inv, InviteResponse::Accept, last_valid).unwrap();
        assert_eq!(inv.status, InvitationStatus::Accepted);
    }

    #[test]
    fn test_oversized_validity_is_rejected() {
        let target = InvitationTarget::User {
            user_id: "bob".to_string(),
        };
        for days in [0, MAX_EXPIRATION_DAYS + 1, u32::MAX] {
            let err = Invitation::new(Uuid::new_v4(), "ana".to_string(), target.clone(), None, days, Utc::now())
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        let longest = Invitation::new(Uuid::new_v4(), "ana".to_string(), target, None, MAX_EXPIRATION_DAYS, Utc::now())
            .unwrap();
        assert_eq!(longest.expires_at - longest.created_at, Duration::days(i64::from(MAX_EXPIRATION_DAYS)));
    }

    #[test]
    fn test_second_response_is_already_resolved() {
        let now = Utc::now();
        let mut inv = invitation(now);
        respond(&mut inv, InviteResponse::Reject, now).unwrap();

        let err = respond(&mut inv, InviteResponse::Accept, now).unwrap_err();
        assert!(matches!(err, PoolError::AlreadyResolved { .. }));
        assert_eq!(inv.status, InvitationStatus::Rejected);
    }

    #[test]
    fn test_zero_day_expiration_rejected() {
        let target = InvitationTarget::User {
            user_id: "bob".to_string(),
        };
        assert!(Invitation::new(Uuid::new_v4(), "ana".to_string(), target, None, 0, Utc::now()).is_err());
    }

    #[test]
    fn test_email_target_matches_identity_email() {
        let target = InvitationTarget::from_parts(None, Some(" Bob@Example.com".to_string())).unwrap();
        assert!(target.matches(&Identity::new("u-77", "bob@example.com")));
        assert!(!target.matches(&Identity::new("u-78", "eve@example.com")));

        assert!(InvitationTarget::from_parts(None, None).is_err());
        assert!(InvitationTarget::from_parts(Some("bob".to_string()), Some("b@x.io".to_string())).is_err());
    }

    #[test]
    fn test_expire_only_pending_past_deadline() {
        let now = Utc::now();
        let mut inv = invitation(now);
        assert!(InvitationChange::Expire.apply_to(&mut inv, now).is_err());
        InvitationChange::Expire
            .apply_to(&mut inv, now + Duration::days(8))
            .unwrap();
        assert_eq!(inv.status, InvitationStatus::Expired);
    }
}
