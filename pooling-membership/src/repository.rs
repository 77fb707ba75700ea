use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pooling_core::table::EntityTable;
use pooling_core::{Identity, PoolError, PoolResult};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::invitation::{Invitation, InvitationChange, InvitationStatus};
use crate::join_request::{JoinRequest, JoinRequestChange};

/// Repository trait for invitation data access
#[async_trait]
pub trait InvitationRepository: Send + Sync {
    /// Store a new invitation. Fails with `Conflict` if an equal target
    /// already has an open invitation to the same group.
    async fn create_invitation(&self, invitation: &Invitation) -> PoolResult<Uuid>;

    async fn get_invitation(&self, id: Uuid) -> PoolResult<Option<Invitation>>;

    /// Invitations whose target is this identity, by user id or email.
    async fn list_addressed_to(&self, identity: &Identity) -> PoolResult<Vec<Invitation>>;

    /// Stored as Pending but past their expiry at `now`.
    async fn list_lapsed(&self, now: DateTime<Utc>) -> PoolResult<Vec<Invitation>>;

    async fn apply_change(&self, id: Uuid, change: InvitationChange, at: DateTime<Utc>) -> PoolResult<Invitation>;
}

/// Repository trait for join request data access
#[async_trait]
pub trait JoinRequestRepository: Send + Sync {
    /// Store a new request. Fails with `Conflict` if the requester already
    /// has a pending request for the group.
    async fn create_request(&self, request: &JoinRequest) -> PoolResult<Uuid>;

    async fn get_request(&self, id: Uuid) -> PoolResult<Option<JoinRequest>>;

    async fn list_for_group(&self, group_id: Uuid) -> PoolResult<Vec<JoinRequest>>;

    async fn list_by_requester(&self, requester_id: &str) -> PoolResult<Vec<JoinRequest>>;

    /// Pending requests on which `voter_id` is required and has not voted.
    async fn list_awaiting_vote(&self, voter_id: &str) -> PoolResult<Vec<JoinRequest>>;

    async fn apply_change(&self, id: Uuid, change: JoinRequestChange, at: DateTime<Utc>) -> PoolResult<JoinRequest>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

pub struct InMemoryInvitationRepository {
    invitations: EntityTable<Invitation>,
    creation: Mutex<()>,
}

impl InMemoryInvitationRepository {
    pub fn new() -> Self {
        Self {
            invitations: EntityTable::new("Invitation"),
            creation: Mutex::new(()),
        }
    }
}

impl Default for InMemoryInvitationRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvitationRepository for InMemoryInvitationRepository {
    async fn create_invitation(&self, invitation: &Invitation) -> PoolResult<Uuid> {
        let _creating = self.creation.lock().unwrap_or_else(PoisonError::into_inner);

        let now = invitation.created_at;
        let duplicate = self.invitations.filter(|i| {
            i.group_id == invitation.group_id && i.target == invitation.target && i.is_open(now)
        })?;
        if !duplicate.is_empty() {
            return Err(PoolError::Conflict(format!(
                "an open invitation to group {} already exists for this invitee",
                invitation.group_id
            )));
        }

        self.invitations.insert(invitation.id, invitation.clone())?;
        Ok(invitation.id)
    }

    async fn get_invitation(&self, id: Uuid) -> PoolResult<Option<Invitation>> {
        self.invitations.get(&id)
    }

    async fn list_addressed_to(&self, identity: &Identity) -> PoolResult<Vec<Invitation>> {
        let mut invitations = self.invitations.filter(|i| i.addressed_to(identity))?;
        invitations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(invitations)
    }

    async fn list_lapsed(&self, now: DateTime<Utc>) -> PoolResult<Vec<Invitation>> {
        self.invitations
            .filter(|i| i.status == InvitationStatus::Pending && i.status_at(now) == InvitationStatus::Expired)
    }

    async fn apply_change(&self, id: Uuid, change: InvitationChange, at: DateTime<Utc>) -> PoolResult<Invitation> {
        self.invitations.apply(&id, |invitation| change.apply_to(invitation, at))
    }
}

pub struct InMemoryJoinRequestRepository {
    requests: EntityTable<JoinRequest>,
    creation: Mutex<()>,
}

impl InMemoryJoinRequestRepository {
    pub fn new() -> Self {
        Self {
            requests: EntityTable::new("JoinRequest"),
            creation: Mutex::new(()),
        }
    }
}

impl Default for InMemoryJoinRequestRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JoinRequestRepository for InMemoryJoinRequestRepository {
    async fn create_request(&self, request: &JoinRequest) -> PoolResult<Uuid> {
        let _creating = self.creation.lock().unwrap_or_else(PoisonError::into_inner);

        let duplicate = self.requests.filter(|r| {
            r.group_id == request.group_id && r.requester_id == request.requester_id && r.is_pending()
        })?;
        if !duplicate.is_empty() {
            return Err(PoolError::Conflict(format!(
                "{} already has a pending request for group {}",
                request.requester_id, request.group_id
            )));
        }

        self.requests.insert(request.id, request.clone())?;
        Ok(request.id)
    }

    async fn get_request(&self, id: Uuid) -> PoolResult<Option<JoinRequest>> {
        self.requests.get(&id)
    }

    async fn list_for_group(&self, group_id: Uuid) -> PoolResult<Vec<JoinRequest>> {
        let mut requests = self.requests.filter(|r| r.group_id == group_id)?;
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(requests)
    }

    async fn list_by_requester(&self, requester_id: &str) -> PoolResult<Vec<JoinRequest>> {
        let mut requests = self.requests.filter(|r| r.requester_id == requester_id)?;
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(requests)
    }

    async fn list_awaiting_vote(&self, voter_id: &str) -> PoolResult<Vec<JoinRequest>> {
        let mut requests = self
            .requests
            .filter(|r| r.is_pending() && r.is_required_voter(voter_id) && !r.has_voted(voter_id))?;
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(requests)
    }

    async fn apply_change(&self, id: Uuid, change: JoinRequestChange, at: DateTime<Utc>) -> PoolResult<JoinRequest> {
        self.requests.apply(&id, |request| change.apply_to(request, at))
    }
}
