use chrono::Duration;
use pooling_core::events::{emit, EventPublisher};
use pooling_core::idempotency::{claim_or_conflict, IdempotencyGuard};
use pooling_core::payment::{ChargeRequest, ChargeStatus};
use pooling_core::{Clock, Identity, PoolError, PoolResult};
use pooling_shared::models::events::{
    DecisionResolvedEvent, ParticipationCancelledEvent, PaymentRecordedEvent, TOPIC_CONFIRMATION, TOPIC_PAYMENTS,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    Cancellation, ConfirmedTrip, Decision, Payment, PaymentPhase, PaymentRecordStatus, TripChange,
};
use crate::orchestrator::PaymentOrchestrator;
use crate::policy::{DecisionPolicy, PenaltyPolicy};
use crate::repository::{require_trip, TripRepository};

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// How long after confirmation members have to pay upfront before a
    /// partial payment opens decision voting.
    pub partial_payment_grace: Duration,
    pub penalty: PenaltyPolicy,
    pub decision: DecisionPolicy,
    pub claim_ttl_seconds: u64,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            partial_payment_grace: Duration::hours(24),
            penalty: PenaltyPolicy::default(),
            decision: DecisionPolicy::default(),
            claim_ttl_seconds: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    /// Minor currency units.
    pub amount: i64,
    pub currency: Option<String>,
    pub method: String,
    pub reference: Option<String>,
}

/// Staged payments, decision voting and withdrawals on confirmed trips.
pub struct PaymentCoordinator {
    trips: Arc<dyn TripRepository>,
    orchestrator: PaymentOrchestrator,
    guard: Arc<dyn IdempotencyGuard>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    settings: PaymentSettings,
}

impl PaymentCoordinator {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        orchestrator: PaymentOrchestrator,
        guard: Arc<dyn IdempotencyGuard>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            trips,
            orchestrator,
            guard,
            events,
            clock,
            settings,
        }
    }

    pub async fn pay_upfront(&self, member: &Identity, trip_id: Uuid, details: PaymentDetails) -> PoolResult<Payment> {
        self.pay(member, trip_id, PaymentPhase::Upfront, details).await
    }

    pub async fn pay_final(&self, member: &Identity, trip_id: Uuid, details: PaymentDetails) -> PoolResult<Payment> {
        self.pay(member, trip_id, PaymentPhase::Final, details).await
    }

    async fn pay(
        &self,
        member: &Identity,
        trip_id: Uuid,
        phase: PaymentPhase,
        details: PaymentDetails,
    ) -> PoolResult<Payment> {
        let trip = require_trip(self.trips.as_ref(), trip_id).await?;
        trip.ensure_can_pay(&member.user_id, phase, self.clock.now())?;
        trip.ensure_amount(&member.user_id, details.amount)?;

        if let Some(currency) = &details.currency {
            if !currency.trim().eq_ignore_ascii_case(&trip.currency) {
                return Err(PoolError::Validation(format!(
                    "trip {} is priced in {}, not {}",
                    trip.id, trip.currency, currency
                )));
            }
        }
        if details.method.trim().is_empty() {
            return Err(PoolError::Validation("payment method is required".to_string()));
        }

        // One charge in flight per member and phase.
        let phase_name = format!("{:?}", phase).to_lowercase();
        let key = format!("payment:{}:{}:{}", trip_id, member.user_id, phase_name);
        claim_or_conflict(self.guard.as_ref(), &key, self.settings.claim_ttl_seconds).await?;

        let result = self.charge_and_record(&trip, member, phase, details).await;
        if result.is_err() {
            if let Err(e) = self.guard.release(&key).await {
                tracing::error!("Failed to release payment claim {}: {}", key, e);
            }
        }
        result
    }

    async fn charge_and_record(
        &self,
        trip: &ConfirmedTrip,
        member: &Identity,
        phase: PaymentPhase,
        details: PaymentDetails,
    ) -> PoolResult<Payment> {
        let request = ChargeRequest {
            confirmed_trip_id: trip.id,
            member_id: member.user_id.clone(),
            amount: details.amount,
            currency: trip.currency.clone(),
            method: details.method.clone(),
            reference: details.reference.clone(),
            requested_at: self.clock.now(),
        };
        let receipt = self.orchestrator.charge(&request).await?;

        let now = self.clock.now();
        let declined = receipt.status == ChargeStatus::Declined;
        let payment = Payment {
            id: Uuid::new_v4(),
            member_id: member.user_id.clone(),
            phase,
            amount: details.amount,
            currency: trip.currency.clone(),
            method: details.method,
            reference: details.reference,
            provider_id: Some(receipt.provider_id),
            status: if declined {
                PaymentRecordStatus::Failed
            } else {
                PaymentRecordStatus::Recorded
            },
            failure_reason: receipt.message.clone().filter(|_| declined),
            recorded_at: now,
        };

        if let Err(e) = self
            .trips
            .apply_change(trip.id, TripChange::RecordPayment(payment.clone()), now)
            .await
        {
            if !declined {
                tracing::error!(
                    "Charge {:?} for {} on trip {} succeeded but was not recorded: {}",
                    payment.provider_id,
                    member.user_id,
                    trip.id,
                    e
                );
            }
            return Err(e);
        }

        let event = PaymentRecordedEvent {
            confirmed_trip_id: trip.id,
            member_id: member.user_id.clone(),
            phase: format!("{:?}", phase).to_uppercase(),
            status: format!("{:?}", payment.status).to_uppercase(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            timestamp: now.timestamp(),
        };
        emit(self.events.as_ref(), TOPIC_PAYMENTS, &trip.id.to_string(), &event).await;

        if declined {
            return Err(PoolError::PaymentDeclined(
                receipt.message.unwrap_or_else(|| "charge declined".to_string()),
            ));
        }

        tracing::info!(
            "{:?} payment of {} {} recorded for {} on trip {}",
            phase,
            payment.amount,
            payment.currency,
            member.user_id,
            trip.id
        );
        Ok(payment)
    }

    pub async fn vote_on_decision(
        &self,
        member: &Identity,
        trip_id: Uuid,
        decision: Decision,
        reason: Option<String>,
    ) -> PoolResult<ConfirmedTrip> {
        let change = TripChange::VoteOnDecision {
            member_id: member.user_id.clone(),
            decision,
            reason,
            policy: self.settings.decision,
            grace: self.settings.partial_payment_grace,
        };
        let trip = self.trips.apply_change(trip_id, change, self.clock.now()).await?;
        tracing::info!("{} voted {:?} on the future of trip {}", member.user_id, decision, trip_id);

        if let Some(outcome) = &trip.decision {
            // Only the vote that resolved it is the last one cast.
            let resolving = trip
                .decision_votes
                .last()
                .map(|v| v.member_id == member.user_id)
                .unwrap_or(false);
            if resolving {
                tracing::info!("Trip {} decision resolved: {:?}", trip_id, outcome.decision);
                let event = DecisionResolvedEvent {
                    confirmed_trip_id: trip.id,
                    outcome: format!("{:?}", outcome.decision).to_uppercase(),
                    continue_votes: outcome.continue_votes,
                    cancel_votes: outcome.cancel_votes,
                    timestamp: outcome.resolved_at.timestamp(),
                };
                emit(self.events.as_ref(), TOPIC_CONFIRMATION, &trip.id.to_string(), &event).await;
            }
        }
        Ok(trip)
    }

    pub async fn cancel_participation(
        &self,
        member: &Identity,
        trip_id: Uuid,
        reason: Option<String>,
    ) -> PoolResult<Cancellation> {
        let change = TripChange::CancelParticipation {
            member_id: member.user_id.clone(),
            reason,
            penalty: self.settings.penalty,
        };
        let trip = self.trips.apply_change(trip_id, change, self.clock.now()).await?;

        let cancellation = trip
            .cancellations
            .iter()
            .rev()
            .find(|c| c.member_id == member.user_id)
            .cloned()
            .ok_or_else(|| PoolError::not_found("Cancellation", format!("{}/{}", trip_id, member.user_id)))?;

        tracing::info!(
            "{} left trip {}: penalty {}, refund {}",
            member.user_id,
            trip_id,
            cancellation.penalty_amount,
            cancellation.refund_amount
        );
        let event = ParticipationCancelledEvent {
            confirmed_trip_id: trip.id,
            member_id: member.user_id.clone(),
            penalty_amount: cancellation.penalty_amount,
            refund_amount: cancellation.refund_amount,
            timestamp: cancellation.cancelled_at.timestamp(),
        };
        emit(self.events.as_ref(), TOPIC_PAYMENTS, &trip.id.to_string(), &event).await;
        Ok(cancellation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirmation::fixtures::{initiate_request, member, world, World};
    use crate::models::TripStatus;
    use crate::orchestrator::MockPaymentAdapter;
    use pooling_core::idempotency::InMemoryIdempotencyGuard;
    use pooling_core::ErrorKind;

    fn details(amount: i64, reference: Option<&str>) -> PaymentDetails {
        PaymentDetails {
            amount,
            currency: Some("eur".to_string()),
            method: "card".to_string(),
            reference: reference.map(str::to_string),
        }
    }

    /// A confirmed trip with every listed member confirmed.
    async fn confirmed(members: &[&str]) -> (World, PaymentCoordinator, Uuid) {
        let w = world(members).await;
        let trip = w
            .confirmation
            .initiate(&member("ana"), initiate_request(w.group_id, 2, 8, 48))
            .await
            .unwrap();
        for id in std::iter::once(&"ana").chain(members.iter()) {
            w.confirmation.confirm_participation(&member(id), trip.id).await.unwrap();
        }

        let payments = PaymentCoordinator::new(
            w.trips.clone(),
            PaymentOrchestrator::new(Arc::new(MockPaymentAdapter)),
            Arc::new(InMemoryIdempotencyGuard::new(w.clock.clone())),
            w.events.clone(),
            w.clock.clone(),
            PaymentSettings::default(),
        );
        (w, payments, trip.id)
    }

    #[tokio::test]
    async fn test_upfront_then_final() {
        let (w, payments, trip_id) = confirmed(&["bob"]).await;
        let bob = member("bob");

        let upfront = payments.pay_upfront(&bob, trip_id, details(20_000, None)).await.unwrap();
        let last = payments.pay_final(&bob, trip_id, details(30_000, None)).await.unwrap();
        assert_eq!(upfront.status, PaymentRecordStatus::Recorded);
        assert_eq!(last.status, PaymentRecordStatus::Recorded);

        let trip = require_trip(w.trips.as_ref(), trip_id).await.unwrap();
        assert!(trip.has_recorded("bob", PaymentPhase::Upfront));
        assert!(trip.has_recorded("bob", PaymentPhase::Final));
        assert_eq!(w.events.count_on(TOPIC_PAYMENTS), 2);
    }

    #[tokio::test]
    async fn test_final_without_upfront_fails() {
        let (_w, payments, trip_id) = confirmed(&["bob"]).await;
        let err = payments
            .pay_final(&member("bob"), trip_id, details(30_000, None))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::UpfrontMissing { .. }));
    }

    #[tokio::test]
    async fn test_double_upfront_is_already_paid() {
        let (_w, payments, trip_id) = confirmed(&["bob"]).await;
        let bob = member("bob");
        payments.pay_upfront(&bob, trip_id, details(20_000, None)).await.unwrap();

        let err = payments.pay_upfront(&bob, trip_id, details(20_000, None)).await.unwrap_err();
        assert!(matches!(err, PoolError::AlreadyPaid { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_declined_charge_is_recorded_and_retryable() {
        let (w, payments, trip_id) = confirmed(&["bob"]).await;
        let bob = member("bob");

        let err = payments
            .pay_upfront(&bob, trip_id, details(20_000, Some("decline")))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::PaymentDeclined(_)));

        let trip = require_trip(w.trips.as_ref(), trip_id).await.unwrap();
        assert_eq!(trip.payments.len(), 1);
        assert_eq!(trip.payments[0].status, PaymentRecordStatus::Failed);

        payments.pay_upfront(&bob, trip_id, details(20_000, None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_failure_records_nothing() {
        let (w, payments, trip_id) = confirmed(&["bob"]).await;
        let err = payments
            .pay_upfront(&member("bob"), trip_id, details(20_000, Some("fail-network")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);

        let trip = require_trip(w.trips.as_ref(), trip_id).await.unwrap();
        assert!(trip.payments.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_charge_is_rejected() {
        let (w, payments, trip_id) = confirmed(&["bob"]).await;
        let bob = member("bob");

        let (a, b) = tokio::join!(
            payments.pay_upfront(&bob, trip_id, details(20_000, None)),
            payments.pay_upfront(&bob, trip_id, details(20_000, None))
        );
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::Conflict));

        let trip = require_trip(w.trips.as_ref(), trip_id).await.unwrap();
        assert_eq!(trip.payments.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_payment_opens_decision_vote() {
        let (w, payments, trip_id) = confirmed(&["bob", "cy", "dee"]).await;
        payments
            .pay_upfront(&member("ana"), trip_id, details(20_000, None))
            .await
            .unwrap();

        let early = payments
            .vote_on_decision(&member("bob"), trip_id, Decision::Cancel, None)
            .await
            .unwrap_err();
        assert_eq!(early.kind(), ErrorKind::Conflict);

        w.clock.advance(Duration::hours(25));
        payments
            .vote_on_decision(&member("bob"), trip_id, Decision::Cancel, None)
            .await
            .unwrap();
        let trip = payments
            .vote_on_decision(&member("ana"), trip_id, Decision::Continue, Some("we can still go".to_string()))
            .await
            .unwrap();

        // 1-1 with half the pool voting: the tie goes to continue
        let outcome = trip.decision.unwrap();
        assert_eq!(outcome.decision, Decision::Continue);
        assert_eq!(trip.status, TripStatus::Confirmed);

        let late = payments
            .vote_on_decision(&member("cy"), trip_id, Decision::Cancel, None)
            .await
            .unwrap_err();
        assert_eq!(late.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_out_of_range_amounts_never_reach_the_trip() {
        let (w, payments, trip_id) = confirmed(&["bob"]).await;
        let bob = member("bob");

        for amount in [0, -500, i64::MAX / 10, 50_001] {
            let err = payments
                .pay_upfront(&bob, trip_id, details(amount, None))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "amount {}", amount);
        }

        payments.pay_upfront(&bob, trip_id, details(40_000, None)).await.unwrap();
        let err = payments.pay_final(&bob, trip_id, details(10_001, None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let cancellation = payments.cancel_participation(&bob, trip_id, None).await.unwrap();
        assert_eq!((cancellation.penalty_amount, cancellation.refund_amount), (8_000, 32_000));

        // the trip stays readable and payable for everyone else
        let trip = require_trip(w.trips.as_ref(), trip_id).await.unwrap();
        assert_eq!(trip.payments.len(), 1);
        payments.pay_upfront(&member("ana"), trip_id, details(20_000, None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_participation_keeps_penalty() {
        let (w, payments, trip_id) = confirmed(&["bob"]).await;
        let bob = member("bob");
        payments.pay_upfront(&bob, trip_id, details(25_000, None)).await.unwrap();

        let cancellation = payments
            .cancel_participation(&bob, trip_id, Some("injury".to_string()))
            .await
            .unwrap();
        assert_eq!(cancellation.penalty_amount, 5_000);
        assert_eq!(cancellation.refund_amount, 20_000);

        let trip = require_trip(w.trips.as_ref(), trip_id).await.unwrap();
        assert_eq!(trip.status, TripStatus::Confirmed);

        let err = payments.pay_final(&bob, trip_id, details(25_000, None)).await.unwrap_err();
        assert!(matches!(err, PoolError::NotAMember { .. }));
    }
}
