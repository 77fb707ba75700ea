use pooling_core::{Identity, PoolResult};
use serde::Serialize;

use crate::admissions::{JoinRequestCoordinator, JoinRequestView};
use crate::invitation::Invitation;
use crate::invitations::InvitationCoordinator;
use crate::join_request::JoinRequest;

/// Everything waiting on the caller across all groups.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingItems {
    pub invitations: Vec<Invitation>,
    pub join_requests_to_vote: Vec<JoinRequestView>,
    pub own_join_requests: Vec<JoinRequest>,
    pub total: usize,
}

pub async fn all_pending_items(
    invitations: &InvitationCoordinator,
    join_requests: &JoinRequestCoordinator,
    identity: &Identity,
) -> PoolResult<PendingItems> {
    let (invitations, to_vote, own) = tokio::try_join!(
        invitations.list_for_user(identity),
        join_requests.awaiting_vote(identity),
        join_requests.submitted_by(identity),
    )?;

    Ok(PendingItems {
        total: invitations.len() + to_vote.len() + own.len(),
        invitations,
        join_requests_to_vote: to_vote,
        own_join_requests: own,
    })
}
