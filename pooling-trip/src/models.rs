use chrono::{DateTime, Duration, NaiveDate, Utc};
use pooling_core::{PoolError, PoolResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::policy::{DecisionPolicy, PenaltyPolicy};

/// Confirmation lifecycle: Initiated → {Confirmed, Expired, Cancelled}.
/// A Confirmed trip can still be cancelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Initiated,
    Confirmed,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentPhase {
    Upfront,
    Final,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentRecordStatus {
    Recorded,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Continue,
    Cancel,
}

impl std::str::FromStr for Decision {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "continue" => Ok(Decision::Continue),
            "cancel" => Ok(Decision::Cancel),
            other => Err(PoolError::Validation(format!("unknown decision: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TripWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub member_id: String,
    pub phase: PaymentPhase,
    pub amount: i64,
    pub currency: String,
    pub method: String,
    pub reference: Option<String>,
    pub provider_id: Option<String>,
    pub status: PaymentRecordStatus,
    pub failure_reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionVote {
    pub member_id: String,
    pub decision: Decision,
    pub reason: Option<String>,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub continue_votes: usize,
    pub cancel_votes: usize,
    pub resolved_at: DateTime<Utc>,
}

/// A member's withdrawal with the penalty kept from their payments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub member_id: String,
    pub reason: Option<String>,
    pub paid_amount: i64,
    pub penalty_amount: i64,
    pub refund_amount: i64,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedTrip {
    pub id: Uuid,
    pub group_id: Uuid,
    pub creator_id: String,
    pub min_members: u32,
    pub max_members: u32,
    pub confirmation_hours: u32,
    pub deadline: DateTime<Utc>,
    /// Member id → time of confirmation.
    pub confirmed_members: BTreeMap<String, DateTime<Utc>>,
    /// Confirmed members who later cancelled their participation.
    pub withdrawn: BTreeSet<String>,
    pub status: TripStatus,
    pub total_amount: i64,
    pub price_per_person: i64,
    pub currency: String,
    pub window: TripWindow,
    pub payments: Vec<Payment>,
    pub decision_votes: Vec<DecisionVote>,
    pub decision: Option<DecisionOutcome>,
    pub cancellations: Vec<Cancellation>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Longest confirmation window a creator may open.
pub const MAX_CONFIRMATION_HOURS: u32 = 24 * 30;

/// Upper bound on any amount, in minor currency units.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Parameters fixed when the creator opens the confirmation window.
#[derive(Debug, Clone)]
pub struct TripTerms {
    pub min_members: u32,
    pub max_members: u32,
    pub confirmation_hours: u32,
    pub total_amount: i64,
    pub price_per_person: i64,
    pub currency: String,
    pub window: TripWindow,
}

impl TripTerms {
    pub fn validate(&self) -> PoolResult<()> {
        if self.min_members == 0 || self.min_members > self.max_members {
            return Err(PoolError::Validation(format!(
                "member bounds must satisfy 1 <= min ({}) <= max ({})",
                self.min_members, self.max_members
            )));
        }
        if self.confirmation_hours == 0 || self.confirmation_hours > MAX_CONFIRMATION_HOURS {
            return Err(PoolError::Validation(format!(
                "confirmation window must be between 1 and {} hours",
                MAX_CONFIRMATION_HOURS
            )));
        }
        for amount in [self.total_amount, self.price_per_person] {
            if !(0..=MAX_AMOUNT).contains(&amount) {
                return Err(PoolError::Validation(format!(
                    "amounts must be between 0 and {}",
                    MAX_AMOUNT
                )));
            }
        }
        if self.currency.trim().len() != 3 {
            return Err(PoolError::Validation(format!("invalid currency code: {}", self.currency)));
        }
        if self.window.end_date < self.window.start_date {
            return Err(PoolError::Validation("trip ends before it starts".to_string()));
        }
        Ok(())
    }
}

impl ConfirmedTrip {
    pub fn new(group_id: Uuid, creator_id: String, terms: TripTerms, now: DateTime<Utc>) -> PoolResult<Self> {
        terms.validate()?;
        let deadline = now
            .checked_add_signed(Duration::hours(i64::from(terms.confirmation_hours)))
            .ok_or_else(|| PoolError::Validation("confirmation deadline out of range".to_string()))?;
        Ok(Self {
            id: Uuid::new_v4(),
            group_id,
            creator_id,
            min_members: terms.min_members,
            max_members: terms.max_members,
            confirmation_hours: terms.confirmation_hours,
            deadline,
            confirmed_members: BTreeMap::new(),
            withdrawn: BTreeSet::new(),
            status: TripStatus::Initiated,
            total_amount: terms.total_amount,
            price_per_person: terms.price_per_person,
            currency: terms.currency.trim().to_uppercase(),
            window: terms.window,
            payments: Vec::new(),
            decision_votes: Vec::new(),
            decision: None,
            cancellations: Vec::new(),
            confirmed_at: None,
            cancelled_at: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Status as observed at `now`. An Initiated trip past its deadline is
    /// Expired for every reader, swept or not.
    pub fn status_at(&self, now: DateTime<Utc>) -> TripStatus {
        if self.status == TripStatus::Initiated && now > self.deadline {
            TripStatus::Expired
        } else {
            self.status
        }
    }

    pub fn observed_at(&self, now: DateTime<Utc>) -> Self {
        let mut observed = self.clone();
        observed.status = self.status_at(now);
        observed
    }

    pub fn scope(&self) -> String {
        format!("trip {}", self.id)
    }

    pub fn is_confirmed_member(&self, member_id: &str) -> bool {
        self.confirmed_members.contains_key(member_id)
    }

    /// Confirmed members who have not withdrawn.
    pub fn paying_pool(&self) -> Vec<&String> {
        self.confirmed_members
            .keys()
            .filter(|m| !self.withdrawn.contains(*m))
            .collect()
    }

    pub fn in_paying_pool(&self, member_id: &str) -> bool {
        self.is_confirmed_member(member_id) && !self.withdrawn.contains(member_id)
    }

    pub fn has_recorded(&self, member_id: &str, phase: PaymentPhase) -> bool {
        self.payments.iter().any(|p| {
            p.member_id == member_id && p.phase == phase && p.status == PaymentRecordStatus::Recorded
        })
    }

    /// Sum of a member's recorded payments.
    pub fn recorded_total(&self, member_id: &str) -> PoolResult<i64> {
        self.payments
            .iter()
            .filter(|p| p.member_id == member_id && p.status == PaymentRecordStatus::Recorded)
            .try_fold(0i64, |sum, p| sum.checked_add(p.amount))
            .ok_or_else(|| PoolError::Validation(format!("payment total for {} out of range", member_id)))
    }

    /// A payment must be positive and keep the member within the price per person.
    pub fn ensure_amount(&self, member_id: &str, amount: i64) -> PoolResult<()> {
        if amount <= 0 {
            return Err(PoolError::Validation("payment amount must be positive".to_string()));
        }
        let after = self
            .recorded_total(member_id)?
            .checked_add(amount)
            .filter(|total| *total <= self.price_per_person);
        if after.is_none() {
            return Err(PoolError::Validation(format!(
                "payment of {} would exceed the price per person of {} {}",
                amount, self.price_per_person, self.currency
            )));
        }
        Ok(())
    }

    pub fn upfront_paid_count(&self) -> usize {
        self.paying_pool()
            .into_iter()
            .filter(|m| self.has_recorded(m, PaymentPhase::Upfront))
            .count()
    }

    /// Some, but not all, of the paying pool has paid upfront, and the
    /// grace period after confirmation has run out.
    pub fn in_partial_payment(&self, grace: Duration, now: DateTime<Utc>) -> bool {
        let Some(confirmed_at) = self.confirmed_at else {
            return false;
        };
        let paid = self.upfront_paid_count();
        let pool = self.paying_pool().len();
        self.status_at(now) == TripStatus::Confirmed && paid > 0 && paid < pool && now >= confirmed_at + grace
    }

    pub fn decision_tally(&self) -> (usize, usize) {
        let cancel = self
            .decision_votes
            .iter()
            .filter(|v| v.decision == Decision::Cancel)
            .count();
        (self.decision_votes.len() - cancel, cancel)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn invalid(&self, now: DateTime<Utc>, to: &str) -> PoolError {
        PoolError::InvalidTransition {
            from: format!("{:?}", self.status_at(now)).to_uppercase(),
            to: to.to_string(),
        }
    }

    // ========================================================================
    // Confirmation
    // ========================================================================

    fn confirm(&mut self, member_id: String, now: DateTime<Utc>) -> PoolResult<()> {
        if now > self.deadline {
            return Err(PoolError::WindowClosed {
                trip_id: self.id,
                deadline: self.deadline,
            });
        }
        if !matches!(self.status, TripStatus::Initiated | TripStatus::Confirmed) {
            return Err(self.invalid(now, "CONFIRMED"));
        }
        if self.is_confirmed_member(&member_id) {
            return Err(PoolError::Conflict(format!(
                "{} already confirmed {}",
                member_id,
                self.scope()
            )));
        }
        if self.confirmed_members.len() as u32 >= self.max_members {
            return Err(PoolError::CapacityExceeded {
                scope: self.scope(),
                max_members: self.max_members,
            });
        }

        self.confirmed_members.insert(member_id, now);
        if self.status == TripStatus::Initiated && self.confirmed_members.len() as u32 >= self.min_members {
            self.status = TripStatus::Confirmed;
            self.confirmed_at = Some(now);
        }
        self.touch(now);
        Ok(())
    }

    fn cancel(&mut self, actor: &str, reason: Option<String>, now: DateTime<Utc>) -> PoolResult<()> {
        if actor != self.creator_id {
            return Err(PoolError::Forbidden(format!(
                "only the creator may cancel {}",
                self.scope()
            )));
        }
        if !matches!(self.status_at(now), TripStatus::Initiated | TripStatus::Confirmed) {
            return Err(self.invalid(now, "CANCELLED"));
        }
        self.status = TripStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.cancel_reason = reason;
        self.touch(now);
        Ok(())
    }

    fn expire(&mut self, now: DateTime<Utc>) -> PoolResult<()> {
        if self.status != TripStatus::Initiated || self.status_at(now) != TripStatus::Expired {
            return Err(self.invalid(now, "EXPIRED"));
        }
        self.status = TripStatus::Expired;
        self.touch(now);
        Ok(())
    }

    // ========================================================================
    // Payments
    // ========================================================================

    /// Checks a payment must pass both before charging and when recording.
    pub fn ensure_can_pay(&self, member_id: &str, phase: PaymentPhase, now: DateTime<Utc>) -> PoolResult<()> {
        if self.status_at(now) != TripStatus::Confirmed {
            return Err(PoolError::Conflict(format!(
                "{} is {:?}, payments need CONFIRMED",
                self.scope(),
                self.status_at(now)
            )));
        }
        if !self.in_paying_pool(member_id) {
            return Err(PoolError::NotAMember {
                scope: self.scope(),
                user_id: member_id.to_string(),
            });
        }
        if phase == PaymentPhase::Final && !self.has_recorded(member_id, PaymentPhase::Upfront) {
            return Err(PoolError::UpfrontMissing {
                trip_id: self.id,
                member_id: member_id.to_string(),
            });
        }
        if self.has_recorded(member_id, phase) {
            return Err(PoolError::AlreadyPaid {
                trip_id: self.id,
                member_id: member_id.to_string(),
                phase: format!("{:?}", phase).to_uppercase(),
            });
        }
        Ok(())
    }

    fn record_payment(&mut self, payment: Payment, now: DateTime<Utc>) -> PoolResult<()> {
        if payment.status == PaymentRecordStatus::Recorded {
            self.ensure_can_pay(&payment.member_id, payment.phase, now)?;
            self.ensure_amount(&payment.member_id, payment.amount)?;
        }
        self.payments.push(payment);
        self.touch(now);
        Ok(())
    }

    // ========================================================================
    // Decision voting and withdrawal
    // ========================================================================

    fn vote_on_decision(
        &mut self,
        member_id: String,
        decision: Decision,
        reason: Option<String>,
        policy: DecisionPolicy,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> PoolResult<()> {
        if let Some(outcome) = &self.decision {
            return Err(PoolError::Conflict(format!(
                "decision on {} already resolved as {:?}",
                self.scope(),
                outcome.decision
            )));
        }
        if !self.in_paying_pool(&member_id) {
            return Err(PoolError::NotAMember {
                scope: self.scope(),
                user_id: member_id,
            });
        }
        if !self.in_partial_payment(grace, now) {
            return Err(PoolError::Conflict(format!(
                "{} is not awaiting a decision: {}/{} members paid upfront",
                self.scope(),
                self.upfront_paid_count(),
                self.paying_pool().len()
            )));
        }
        if self.decision_votes.iter().any(|v| v.member_id == member_id) {
            return Err(PoolError::Conflict(format!(
                "{} already voted on the decision for {}",
                member_id,
                self.scope()
            )));
        }

        self.decision_votes.push(DecisionVote {
            member_id,
            decision,
            reason,
            cast_at: now,
        });

        let (continue_votes, cancel_votes) = self.decision_tally();
        if let Some(outcome) = policy.evaluate(continue_votes, cancel_votes, self.paying_pool().len()) {
            self.decision = Some(DecisionOutcome {
                decision: outcome,
                continue_votes,
                cancel_votes,
                resolved_at: now,
            });
            if outcome == Decision::Cancel {
                self.status = TripStatus::Cancelled;
                self.cancelled_at = Some(now);
                self.cancel_reason = Some("cancelled by decision vote".to_string());
            }
        }
        self.touch(now);
        Ok(())
    }

    fn cancel_participation(
        &mut self,
        member_id: String,
        reason: Option<String>,
        penalty: PenaltyPolicy,
        now: DateTime<Utc>,
    ) -> PoolResult<()> {
        if !matches!(self.status_at(now), TripStatus::Initiated | TripStatus::Confirmed) {
            return Err(self.invalid(now, "WITHDRAWN"));
        }
        if self.withdrawn.contains(&member_id) {
            return Err(PoolError::Conflict(format!(
                "{} already cancelled participation in {}",
                member_id,
                self.scope()
            )));
        }
        if !self.is_confirmed_member(&member_id) {
            return Err(PoolError::NotAMember {
                scope: self.scope(),
                user_id: member_id,
            });
        }

        let paid = self.recorded_total(&member_id)?;
        let (mut kept, mut refunded) = (0i64, 0i64);
        for payment in self
            .payments
            .iter()
            .filter(|p| p.member_id == member_id && p.status == PaymentRecordStatus::Recorded)
        {
            let (penalty_amount, refund_amount) = penalty.split(payment.amount);
            kept = kept.saturating_add(penalty_amount);
            refunded = refunded.saturating_add(refund_amount);
        }

        self.withdrawn.insert(member_id.clone());
        self.cancellations.push(Cancellation {
            member_id,
            reason,
            paid_amount: paid,
            penalty_amount: kept,
            refund_amount: refunded,
            cancelled_at: now,
        });
        self.touch(now);
        Ok(())
    }
}

/// A mutation of a confirmed trip, applied atomically by the repository.
#[derive(Debug, Clone)]
pub enum TripChange {
    Confirm {
        member_id: String,
    },
    Cancel {
        actor: String,
        reason: Option<String>,
    },
    Expire,
    RecordPayment(Payment),
    VoteOnDecision {
        member_id: String,
        decision: Decision,
        reason: Option<String>,
        policy: DecisionPolicy,
        grace: Duration,
    },
    CancelParticipation {
        member_id: String,
        reason: Option<String>,
        penalty: PenaltyPolicy,
    },
}

impl TripChange {
    pub fn apply_to(self, trip: &mut ConfirmedTrip, now: DateTime<Utc>) -> PoolResult<()> {
        match self {
            TripChange::Confirm { member_id } => trip.confirm(member_id, now),
            TripChange::Cancel { actor, reason } => trip.cancel(&actor, reason, now),
            TripChange::Expire => trip.expire(now),
            TripChange::RecordPayment(payment) => trip.record_payment(payment, now),
            TripChange::VoteOnDecision {
                member_id,
                decision,
                reason,
                policy,
                grace,
            } => trip.vote_on_decision(member_id, decision, reason, policy, grace, now),
            TripChange::CancelParticipation {
                member_id,
                reason,
                penalty,
            } => trip.cancel_participation(member_id, reason, penalty, now),
        }
    }
}
