use chrono::{DateTime, Utc};
use pooling_core::{PoolError, PoolResult};
use pooling_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Approve,
    Reject,
}

impl VoteChoice {
    pub fn from_approved(approved: bool) -> Self {
        if approved {
            VoteChoice::Approve
        } else {
            VoteChoice::Reject
        }
    }
}

/// When a reject vote resolves a request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JoinRejectionPolicy {
    /// Wait for every required voter; any reject then means Rejected.
    #[default]
    AwaitAllVotes,
    /// The first reject resolves the request.
    FailFast,
}

/// Outcome of adding an approved requester to the roster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Admission {
    Admitted,
    /// Approved, but the roster was full; needs operator review.
    Unfulfilled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub choice: VoteChoice,
    pub reason: Option<String>,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub id: Uuid,
    pub group_id: Uuid,
    pub requester_id: String,
    pub requester_email: Option<Masked<String>>,
    pub message: Option<String>,
    pub profile: serde_json::Value,
    /// Roster at submission time; fixed for the life of the request.
    pub required_voters: BTreeSet<String>,
    pub votes: BTreeMap<String, Vote>,
    pub status: JoinRequestStatus,
    pub admission: Option<Admission>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl JoinRequest {
    pub fn new(
        group_id: Uuid,
        requester_id: String,
        requester_email: Option<Masked<String>>,
        message: Option<String>,
        profile: serde_json::Value,
        roster: Vec<String>,
        now: DateTime<Utc>,
    ) -> PoolResult<Self> {
        let required_voters: BTreeSet<String> = roster.into_iter().filter(|m| *m != requester_id).collect();
        if required_voters.is_empty() {
            return Err(PoolError::Validation(format!(
                "group {} has no members to vote on a join request",
                group_id
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            group_id,
            requester_id,
            requester_email,
            message,
            profile,
            required_voters,
            votes: BTreeMap::new(),
            status: JoinRequestStatus::Pending,
            admission: None,
            created_at: now,
            resolved_at: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == JoinRequestStatus::Pending
    }

    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.votes.contains_key(voter_id)
    }

    pub fn is_required_voter(&self, voter_id: &str) -> bool {
        self.required_voters.contains(voter_id)
    }

    /// Required voters that have not voted yet.
    pub fn pending_voters(&self) -> Vec<String> {
        self.required_voters
            .iter()
            .filter(|v| !self.votes.contains_key(*v))
            .cloned()
            .collect()
    }

    pub fn approvals(&self) -> usize {
        self.votes.values().filter(|v| v.choice == VoteChoice::Approve).count()
    }

    fn cast_vote(
        &mut self,
        voter_id: String,
        choice: VoteChoice,
        reason: Option<String>,
        policy: JoinRejectionPolicy,
        now: DateTime<Utc>,
    ) -> PoolResult<()> {
        if !self.is_pending() {
            return Err(PoolError::AlreadyResolved {
                entity: "JoinRequest",
                id: self.id.to_string(),
                status: format!("{:?}", self.status),
            });
        }
        if !self.is_required_voter(&voter_id) {
            return Err(PoolError::Conflict(format!(
                "{} is not a required voter on join request {}",
                voter_id, self.id
            )));
        }
        if self.has_voted(&voter_id) {
            return Err(PoolError::Conflict(format!(
                "{} already voted on join request {}",
                voter_id, self.id
            )));
        }

        self.votes.insert(
            voter_id,
            Vote {
                choice,
                reason,
                cast_at: now,
            },
        );

        let resolved = if choice == VoteChoice::Reject && policy == JoinRejectionPolicy::FailFast {
            Some(JoinRequestStatus::Rejected)
        } else if self.votes.len() == self.required_voters.len() {
            if self.approvals() == self.required_voters.len() {
                Some(JoinRequestStatus::Approved)
            } else {
                Some(JoinRequestStatus::Rejected)
            }
        } else {
            None
        };

        if let Some(status) = resolved {
            self.status = status;
            self.resolved_at = Some(now);
        }
        Ok(())
    }

    fn record_admission(&mut self, admission: Admission) -> PoolResult<()> {
        if self.status != JoinRequestStatus::Approved || self.admission.is_some() {
            return Err(PoolError::InvalidTransition {
                from: format!("{:?}/{:?}", self.status, self.admission),
                to: format!("{:?}", admission).to_uppercase(),
            });
        }
        self.admission = Some(admission);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum JoinRequestChange {
    Vote {
        voter_id: String,
        choice: VoteChoice,
        reason: Option<String>,
        policy: JoinRejectionPolicy,
    },
    RecordAdmission(Admission),
}

impl JoinRequestChange {
    pub fn apply_to(self, request: &mut JoinRequest, now: DateTime<Utc>) -> PoolResult<()> {
        match self {
            JoinRequestChange::Vote {
                voter_id,
                choice,
                reason,
                policy,
            } => request.cast_vote(voter_id, choice, reason, policy, now),
            JoinRequestChange::RecordAdmission(admission) => request.record_admission(admission),
        }
    }
}
