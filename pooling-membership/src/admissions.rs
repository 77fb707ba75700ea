use pooling_catalog::{require_group, GroupChange, GroupRepository, GroupStatus, Visibility};
use pooling_core::events::{emit, EventPublisher};
use pooling_core::{Clock, Identity, PoolError, PoolResult};
use pooling_shared::models::events::{JoinRequestResolvedEvent, TOPIC_MEMBERSHIP};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::join_request::{Admission, JoinRejectionPolicy, JoinRequest, JoinRequestChange, JoinRequestStatus, VoteChoice};
use crate::repository::JoinRequestRepository;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJoinRequest {
    pub group_id: Uuid,
    pub message: Option<String>,
    #[serde(default)]
    pub profile: serde_json::Value,
}

/// A pending request as seen by one voting member.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestView {
    #[serde(flatten)]
    pub request: JoinRequest,
    pub pending_voters: Vec<String>,
    pub caller_has_voted: bool,
    pub approvals: usize,
    pub required_votes: usize,
}

impl JoinRequestView {
    fn for_caller(request: JoinRequest, caller_id: &str) -> Self {
        Self {
            pending_voters: request.pending_voters(),
            caller_has_voted: request.has_voted(caller_id),
            approvals: request.approvals(),
            required_votes: request.required_voters.len(),
            request,
        }
    }
}

/// Quorum-voted admission of new members into public groups.
pub struct JoinRequestCoordinator {
    groups: Arc<dyn GroupRepository>,
    requests: Arc<dyn JoinRequestRepository>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    rejection_policy: JoinRejectionPolicy,
}

impl JoinRequestCoordinator {
    pub fn new(
        groups: Arc<dyn GroupRepository>,
        requests: Arc<dyn JoinRequestRepository>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        rejection_policy: JoinRejectionPolicy,
    ) -> Self {
        Self {
            groups,
            requests,
            events,
            clock,
            rejection_policy,
        }
    }

    pub async fn submit(&self, requester: &Identity, request: NewJoinRequest) -> PoolResult<JoinRequest> {
        let group = require_group(self.groups.as_ref(), request.group_id).await?;

        if group.visibility == Visibility::Private {
            return Err(PoolError::Forbidden(format!(
                "group {} only admits invited members",
                group.id
            )));
        }
        if group.status == GroupStatus::Closed {
            return Err(PoolError::Conflict(format!("group {} is closed", group.id)));
        }
        if group.is_member(&requester.user_id) {
            return Err(PoolError::Conflict(format!(
                "{} is already a member of group {}",
                requester.user_id, group.id
            )));
        }
        if group.is_full() {
            return Err(PoolError::CapacityExceeded {
                scope: group.scope(),
                max_members: group.capacity.max_members,
            });
        }

        let join_request = JoinRequest::new(
            group.id,
            requester.user_id.clone(),
            Some(requester.email.clone()),
            request.message,
            request.profile,
            group.member_ids(),
            self.clock.now(),
        )?;
        self.requests.create_request(&join_request).await?;

        tracing::info!(
            "Join request {} from {} to group {} needs {} votes",
            join_request.id,
            requester.user_id,
            group.id,
            join_request.required_voters.len()
        );
        Ok(join_request)
    }

    /// Pending requests on a group, with the voting progress the caller needs.
    pub async fn list_pending(&self, caller: &Identity, group_id: Uuid) -> PoolResult<Vec<JoinRequestView>> {
        let group = require_group(self.groups.as_ref(), group_id).await?;
        group.ensure_member(&caller.user_id)?;

        Ok(self
            .requests
            .list_for_group(group_id)
            .await?
            .into_iter()
            .filter(|r| r.is_pending())
            .map(|r| JoinRequestView::for_caller(r, &caller.user_id))
            .collect())
    }

    /// Pending requests anywhere that still wait on the caller's vote.
    pub async fn awaiting_vote(&self, voter: &Identity) -> PoolResult<Vec<JoinRequestView>> {
        Ok(self
            .requests
            .list_awaiting_vote(&voter.user_id)
            .await?
            .into_iter()
            .map(|r| JoinRequestView::for_caller(r, &voter.user_id))
            .collect())
    }

    /// The caller's own requests that are still being voted on.
    pub async fn submitted_by(&self, requester: &Identity) -> PoolResult<Vec<JoinRequest>> {
        Ok(self
            .requests
            .list_by_requester(&requester.user_id)
            .await?
            .into_iter()
            .filter(|r| r.is_pending())
            .collect())
    }

    /// The requester's open request on a group.
    pub async fn find_pending(&self, group_id: Uuid, requester_id: &str) -> PoolResult<JoinRequest> {
        self.requests
            .list_for_group(group_id)
            .await?
            .into_iter()
            .find(|r| r.requester_id == requester_id && r.is_pending())
            .ok_or_else(|| PoolError::not_found("JoinRequest", format!("{}/{}", group_id, requester_id)))
    }

    pub async fn vote(
        &self,
        voter: &Identity,
        group_id: Uuid,
        request_id: Uuid,
        choice: VoteChoice,
        reason: Option<String>,
    ) -> PoolResult<JoinRequest> {
        let existing = self
            .requests
            .get_request(request_id)
            .await?
            .filter(|r| r.group_id == group_id)
            .ok_or_else(|| PoolError::not_found("JoinRequest", request_id))?;

        let now = self.clock.now();
        let change = JoinRequestChange::Vote {
            voter_id: voter.user_id.clone(),
            choice,
            reason,
            policy: self.rejection_policy,
        };
        let request = self.requests.apply_change(existing.id, change, now).await?;
        tracing::info!(
            "{} voted {:?} on join request {} ({}/{} votes)",
            voter.user_id,
            choice,
            request.id,
            request.votes.len(),
            request.required_voters.len()
        );

        match request.status {
            JoinRequestStatus::Pending => Ok(request),
            JoinRequestStatus::Rejected => {
                self.publish_resolution(&request, false).await;
                Ok(request)
            }
            JoinRequestStatus::Approved => self.admit(request).await,
        }
    }

    /// Add an approved requester to the roster. The group applies the
    /// capacity check under its own lock, so of two racing approvals only
    /// one gets the last spot.
    async fn admit(&self, request: JoinRequest) -> PoolResult<JoinRequest> {
        let now = self.clock.now();
        let change = GroupChange::Admit {
            user_id: request.requester_id.clone(),
            email: request.requester_email.clone(),
        };

        match self.groups.apply_change(request.group_id, change, now).await {
            Ok(_) => {
                let request = self
                    .requests
                    .apply_change(request.id, JoinRequestChange::RecordAdmission(Admission::Admitted), now)
                    .await?;
                tracing::info!("{} admitted to group {}", request.requester_id, request.group_id);
                self.publish_resolution(&request, true).await;
                Ok(request)
            }
            Err(e) => {
                tracing::warn!(
                    "Join request {} approved but unfulfilled, flagged for review: {}",
                    request.id,
                    e
                );
                let request = self
                    .requests
                    .apply_change(request.id, JoinRequestChange::RecordAdmission(Admission::Unfulfilled), now)
                    .await?;
                self.publish_resolution(&request, false).await;
                Err(e)
            }
        }
    }

    async fn publish_resolution(&self, request: &JoinRequest, admitted: bool) {
        let event = JoinRequestResolvedEvent {
            request_id: request.id,
            group_id: request.group_id,
            requester_id: request.requester_id.clone(),
            status: format!("{:?}", request.status).to_uppercase(),
            admitted,
            timestamp: self.clock.now().timestamp(),
        };
        emit(self.events.as_ref(), TOPIC_MEMBERSHIP, &request.id.to_string(), &event).await;
    }
}
