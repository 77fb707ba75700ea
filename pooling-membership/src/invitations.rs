use pooling_catalog::{require_group, Group, GroupChange, GroupRepository, GroupStatus};
use pooling_core::events::{emit, EventPublisher};
use pooling_core::{Clock, Identity, PoolError, PoolResult};
use pooling_shared::models::events::{InvitationRespondedEvent, TOPIC_MEMBERSHIP};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::invitation::{Invitation, InvitationChange, InvitationStatus, InvitationTarget, InviteResponse};
use crate::repository::InvitationRepository;

#[derive(Debug, Clone)]
pub struct InvitationSettings {
    pub default_expiration_days: u32,
}

impl Default for InvitationSettings {
    fn default() -> Self {
        Self {
            default_expiration_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInvitation {
    pub group_id: Uuid,
    pub target: InvitationTarget,
    pub message: Option<String>,
    pub expiration_days: Option<u32>,
}

/// Direct, time-bounded invitations from a member to a specific person.
pub struct InvitationCoordinator {
    groups: Arc<dyn GroupRepository>,
    invitations: Arc<dyn InvitationRepository>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    settings: InvitationSettings,
}

impl InvitationCoordinator {
    pub fn new(
        groups: Arc<dyn GroupRepository>,
        invitations: Arc<dyn InvitationRepository>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        settings: InvitationSettings,
    ) -> Self {
        Self {
            groups,
            invitations,
            events,
            clock,
            settings,
        }
    }

    pub async fn invite(&self, inviter: &Identity, request: NewInvitation) -> PoolResult<Invitation> {
        let group = require_group(self.groups.as_ref(), request.group_id).await?;
        group.ensure_member(&inviter.user_id)?;

        if group.status == GroupStatus::Closed {
            return Err(PoolError::Conflict(format!("group {} is closed", group.id)));
        }
        if target_is_member(&group, &request.target) {
            return Err(PoolError::Conflict(format!(
                "invitee is already a member of group {}",
                group.id
            )));
        }
        if group.is_full() {
            return Err(PoolError::CapacityExceeded {
                scope: group.scope(),
                max_members: group.capacity.max_members,
            });
        }

        let invitation = Invitation::new(
            group.id,
            inviter.user_id.clone(),
            request.target,
            request.message,
            request
                .expiration_days
                .unwrap_or(self.settings.default_expiration_days),
            self.clock.now(),
        )?;
        self.invitations.create_invitation(&invitation).await?;

        tracing::info!(
            "Invitation {} to group {} sent by {}, expires {}",
            invitation.id,
            group.id,
            inviter.user_id,
            invitation.expires_at
        );
        Ok(invitation)
    }

    /// Open invitations addressed to the caller, by user id or email.
    pub async fn list_for_user(&self, identity: &Identity) -> PoolResult<Vec<Invitation>> {
        let now = self.clock.now();
        Ok(self
            .invitations
            .list_addressed_to(identity)
            .await?
            .into_iter()
            .filter(|i| i.is_open(now))
            .collect())
    }

    pub async fn respond(
        &self,
        identity: &Identity,
        invitation_id: Uuid,
        response: InviteResponse,
        message: Option<String>,
    ) -> PoolResult<Invitation> {
        let invitation = self
            .invitations
            .get_invitation(invitation_id)
            .await?
            .ok_or_else(|| PoolError::not_found("Invitation", invitation_id))?;

        if !invitation.addressed_to(identity) {
            return Err(PoolError::Forbidden(format!(
                "invitation {} is not addressed to {}",
                invitation_id, identity.user_id
            )));
        }

        let now = self.clock.now();
        if response == InviteResponse::Accept && invitation.is_open(now) {
            // Refuse before consuming the invitation when the roster cannot take the invitee.
            let group = require_group(self.groups.as_ref(), invitation.group_id).await?;
            if group.is_member(&identity.user_id) {
                return Err(PoolError::Conflict(format!(
                    "{} is already a member of group {}",
                    identity.user_id, group.id
                )));
            }
            if group.is_full() {
                return Err(PoolError::CapacityExceeded {
                    scope: group.scope(),
                    max_members: group.capacity.max_members,
                });
            }
        }

        let change = InvitationChange::Respond {
            responder_id: identity.user_id.clone(),
            response,
            message,
        };
        let invitation = self.invitations.apply_change(invitation_id, change, now).await?;

        if invitation.status == InvitationStatus::Accepted {
            let admit = GroupChange::Admit {
                user_id: identity.user_id.clone(),
                email: Some(identity.email.clone()),
            };
            if let Err(e) = self.groups.apply_change(invitation.group_id, admit, now).await {
                tracing::warn!(
                    "Invitation {} accepted but {} could not be added to group {}: {}",
                    invitation.id,
                    identity.user_id,
                    invitation.group_id,
                    e
                );
                self.invitations
                    .apply_change(invitation.id, InvitationChange::MarkUnfulfilled, now)
                    .await?;
                return Err(e);
            }
        }

        tracing::info!(
            "Invitation {} {:?} by {}",
            invitation.id,
            invitation.status,
            identity.user_id
        );
        let event = InvitationRespondedEvent {
            invitation_id: invitation.id,
            group_id: invitation.group_id,
            invitee_id: identity.user_id.clone(),
            status: format!("{:?}", invitation.status).to_uppercase(),
            timestamp: now.timestamp(),
        };
        emit(self.events.as_ref(), TOPIC_MEMBERSHIP, &invitation.id.to_string(), &event).await;

        Ok(invitation)
    }

    /// Store Expired on every lapsed pending invitation.
    pub async fn sweep_expired(&self) -> PoolResult<usize> {
        let now = self.clock.now();
        let mut expired = 0;
        for invitation in self.invitations.list_lapsed(now).await? {
            match self
                .invitations
                .apply_change(invitation.id, InvitationChange::Expire, now)
                .await
            {
                Ok(_) => expired += 1,
                // Answered or expired by someone else in the meantime.
                Err(e) => tracing::debug!("Skipped expiring invitation {}: {}", invitation.id, e),
            }
        }
        Ok(expired)
    }
}

fn target_is_member(group: &Group, target: &InvitationTarget) -> bool {
    match target {
        InvitationTarget::User { user_id } => group.is_member(user_id),
        InvitationTarget::Email { email } => group
            .members
            .iter()
            .filter_map(|m| m.email.as_ref())
            .any(|e| e.matches_email(email.expose())),
    }
}
