use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pooling_core::table::EntityTable;
use pooling_core::{PoolError, PoolResult};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::models::{ConfirmedTrip, TripChange, TripStatus};

/// Repository trait for confirmed trip data access
#[async_trait]
pub trait TripRepository: Send + Sync {
    /// Fails with `Conflict` if the group already has an Initiated or
    /// Confirmed trip as of `trip.created_at`.
    async fn create_trip(&self, trip: &ConfirmedTrip) -> PoolResult<Uuid>;

    async fn get_trip(&self, id: Uuid) -> PoolResult<Option<ConfirmedTrip>>;

    async fn list_for_group(&self, group_id: Uuid) -> PoolResult<Vec<ConfirmedTrip>>;

    /// Stored as Initiated with the deadline passed at `now`.
    async fn list_lapsed(&self, now: DateTime<Utc>) -> PoolResult<Vec<ConfirmedTrip>>;

    async fn apply_change(&self, id: Uuid, change: TripChange, at: DateTime<Utc>) -> PoolResult<ConfirmedTrip>;
}

pub async fn require_trip(repo: &dyn TripRepository, id: Uuid) -> PoolResult<ConfirmedTrip> {
    repo.get_trip(id)
        .await?
        .ok_or_else(|| PoolError::not_found("ConfirmedTrip", id))
}

pub struct InMemoryTripRepository {
    trips: EntityTable<ConfirmedTrip>,
    creation: Mutex<()>,
}

impl InMemoryTripRepository {
    pub fn new() -> Self {
        Self {
            trips: EntityTable::new("ConfirmedTrip"),
            creation: Mutex::new(()),
        }
    }
}

impl Default for InMemoryTripRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TripRepository for InMemoryTripRepository {
    async fn create_trip(&self, trip: &ConfirmedTrip) -> PoolResult<Uuid> {
        let _creating = self.creation.lock().unwrap_or_else(PoisonError::into_inner);

        let now = trip.created_at;
        let live = self.trips.filter(|t| {
            t.group_id == trip.group_id && matches!(t.status_at(now), TripStatus::Initiated | TripStatus::Confirmed)
        })?;
        if !live.is_empty() {
            return Err(PoolError::Conflict(format!(
                "group {} already has a trip in confirmation",
                trip.group_id
            )));
        }

        self.trips.insert(trip.id, trip.clone())?;
        Ok(trip.id)
    }

    async fn get_trip(&self, id: Uuid) -> PoolResult<Option<ConfirmedTrip>> {
        self.trips.get(&id)
    }

    async fn list_for_group(&self, group_id: Uuid) -> PoolResult<Vec<ConfirmedTrip>> {
        let mut trips = self.trips.filter(|t| t.group_id == group_id)?;
        trips.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(trips)
    }

    async fn list_lapsed(&self, now: DateTime<Utc>) -> PoolResult<Vec<ConfirmedTrip>> {
        self.trips
            .filter(|t| t.status == TripStatus::Initiated && t.status_at(now) == TripStatus::Expired)
    }

    async fn apply_change(&self, id: Uuid, change: TripChange, at: DateTime<Utc>) -> PoolResult<ConfirmedTrip> {
        self.trips.apply(&id, |trip| change.apply_to(trip, at))
    }
}
