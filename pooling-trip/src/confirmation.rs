use chrono::{DateTime, NaiveDate, Utc};
use pooling_catalog::{require_group, GroupRepository, GroupStatus};
use pooling_core::events::{emit, EventPublisher};
use pooling_core::{Clock, Identity, PoolError, PoolResult};
use pooling_shared::models::events::{TripStatusChangedEvent, TOPIC_CONFIRMATION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ConfirmedTrip, Payment, PaymentPhase, TripChange, TripStatus, TripTerms, TripWindow};
use crate::repository::{require_trip, TripRepository};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateConfirmation {
    pub group_id: Uuid,
    pub min_members: u32,
    pub max_members: u32,
    pub confirmation_hours: u32,
    pub total_amount: i64,
    pub price_per_person: i64,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStatusView {
    pub confirmed_trip_id: Uuid,
    pub status: TripStatus,
    pub deadline: DateTime<Utc>,
    pub seconds_remaining: i64,
    pub confirmed_count: usize,
    pub min_members: u32,
    pub max_members: u32,
    pub caller_confirmed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDetails {
    pub trip: ConfirmedTrip,
    pub caller_payments: Vec<Payment>,
    pub caller_upfront_paid: bool,
    pub caller_final_paid: bool,
    pub upfront_paid_count: usize,
}

/// Per-member confirmation of a group's trip within a deadline.
pub struct ConfirmationCoordinator {
    groups: Arc<dyn GroupRepository>,
    trips: Arc<dyn TripRepository>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl ConfirmationCoordinator {
    pub fn new(
        groups: Arc<dyn GroupRepository>,
        trips: Arc<dyn TripRepository>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            groups,
            trips,
            events,
            clock,
        }
    }

    pub async fn initiate(&self, creator: &Identity, request: InitiateConfirmation) -> PoolResult<ConfirmedTrip> {
        let group = require_group(self.groups.as_ref(), request.group_id).await?;
        group.ensure_creator(&creator.user_id)?;
        if group.status == GroupStatus::Closed {
            return Err(PoolError::Conflict(format!("group {} is closed", group.id)));
        }

        let now = self.clock.now();
        let terms = TripTerms {
            min_members: request.min_members,
            max_members: request.max_members,
            confirmation_hours: request.confirmation_hours,
            total_amount: request.total_amount,
            price_per_person: request.price_per_person,
            currency: request.currency,
            window: TripWindow {
                start_date: request.start_date,
                end_date: request.end_date,
            },
        };
        let trip = ConfirmedTrip::new(group.id, creator.user_id.clone(), terms, now)?;
        self.trips.create_trip(&trip).await?;

        tracing::info!(
            "Confirmation for group {} opened as trip {}, deadline {}",
            group.id,
            trip.id,
            trip.deadline
        );
        self.publish(&trip, None).await;
        Ok(trip)
    }

    pub async fn confirm_participation(&self, member: &Identity, trip_id: Uuid) -> PoolResult<ConfirmedTrip> {
        let trip = require_trip(self.trips.as_ref(), trip_id).await?;
        let group = require_group(self.groups.as_ref(), trip.group_id).await?;
        group.ensure_member(&member.user_id)?;

        let change = TripChange::Confirm {
            member_id: member.user_id.clone(),
        };
        let updated = self.trips.apply_change(trip_id, change, self.clock.now()).await?;

        tracing::info!(
            "{} confirmed trip {} ({}/{} needed)",
            member.user_id,
            trip_id,
            updated.confirmed_members.len(),
            updated.min_members
        );
        if trip.status != updated.status {
            self.publish(&updated, None).await;
        }
        Ok(updated)
    }

    pub async fn cancel(&self, creator: &Identity, trip_id: Uuid, reason: Option<String>) -> PoolResult<ConfirmedTrip> {
        let change = TripChange::Cancel {
            actor: creator.user_id.clone(),
            reason: reason.clone(),
        };
        let trip = self.trips.apply_change(trip_id, change, self.clock.now()).await?;

        tracing::info!("Trip {} cancelled by {}", trip_id, creator.user_id);
        self.publish(&trip, reason).await;
        Ok(trip)
    }

    pub async fn status(&self, caller: &Identity, trip_id: Uuid) -> PoolResult<TripStatusView> {
        let trip = self.visible_trip(caller, trip_id).await?;
        let now = self.clock.now();

        Ok(TripStatusView {
            confirmed_trip_id: trip.id,
            status: trip.status_at(now),
            deadline: trip.deadline,
            seconds_remaining: (trip.deadline - now).num_seconds().max(0),
            confirmed_count: trip.confirmed_members.len(),
            min_members: trip.min_members,
            max_members: trip.max_members,
            caller_confirmed: trip.is_confirmed_member(&caller.user_id),
        })
    }

    pub async fn details(&self, caller: &Identity, trip_id: Uuid) -> PoolResult<TripDetails> {
        let trip = self.visible_trip(caller, trip_id).await?;
        let caller_payments = trip
            .payments
            .iter()
            .filter(|p| p.member_id == caller.user_id)
            .cloned()
            .collect();

        Ok(TripDetails {
            caller_upfront_paid: trip.has_recorded(&caller.user_id, PaymentPhase::Upfront),
            caller_final_paid: trip.has_recorded(&caller.user_id, PaymentPhase::Final),
            upfront_paid_count: trip.upfront_paid_count(),
            caller_payments,
            trip: trip.observed_at(self.clock.now()),
        })
    }

    /// Store Expired on every trip whose confirmation window lapsed. Reads
    /// already observe the expiry; this makes it durable and announces it.
    pub async fn sweep_expired(&self) -> PoolResult<usize> {
        let now = self.clock.now();
        let mut expired = 0;
        for trip in self.trips.list_lapsed(now).await? {
            match self.trips.apply_change(trip.id, TripChange::Expire, now).await {
                Ok(trip) => {
                    expired += 1;
                    tracing::info!(
                        "Trip {} expired with {}/{} confirmations",
                        trip.id,
                        trip.confirmed_members.len(),
                        trip.min_members
                    );
                    self.publish(&trip, Some("confirmation window elapsed".to_string())).await;
                }
                Err(e) => tracing::debug!("Skipped expiring trip {}: {}", trip.id, e),
            }
        }
        Ok(expired)
    }

    /// Trips are readable by members of their group.
    async fn visible_trip(&self, caller: &Identity, trip_id: Uuid) -> PoolResult<ConfirmedTrip> {
        let trip = require_trip(self.trips.as_ref(), trip_id).await?;
        if !trip.is_confirmed_member(&caller.user_id) {
            let group = require_group(self.groups.as_ref(), trip.group_id).await?;
            group.ensure_member(&caller.user_id)?;
        }
        Ok(trip)
    }

    async fn publish(&self, trip: &ConfirmedTrip, reason: Option<String>) {
        let event = TripStatusChangedEvent {
            confirmed_trip_id: trip.id,
            group_id: trip.group_id,
            status: format!("{:?}", trip.status).to_uppercase(),
            confirmed_members: trip.confirmed_members.len(),
            reason,
            timestamp: self.clock.now().timestamp(),
        };
        emit(self.events.as_ref(), TOPIC_CONFIRMATION, &trip.id.to_string(), &event).await;
    }
}
