use chrono::{DateTime, NaiveDate, Utc};
use pooling_core::{Identity, PoolError, PoolResult};
use pooling_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    Public,
    Private,
}

/// Group lifecycle: Open while recruiting, Active once the creator
/// finalizes the roster, Closed when cancelled or done.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupStatus {
    Open,
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BudgetLevel {
    Budget,
    Moderate,
    Luxury,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Capacity {
    pub min_members: u32,
    pub max_members: u32,
}

impl Capacity {
    pub fn new(min_members: u32, max_members: u32) -> PoolResult<Self> {
        if min_members == 0 || min_members > max_members {
            return Err(PoolError::Validation(format!(
                "capacity must satisfy 1 <= min ({}) <= max ({})",
                min_members, max_members
            )));
        }
        Ok(Self {
            min_members,
            max_members,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripAttributes {
    pub base_city: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget_level: BudgetLevel,
    #[serde(default)]
    pub preferred_terrains: Vec<String>,
    #[serde(default)]
    pub preferred_activities: Vec<String>,
}

impl TripAttributes {
    pub fn validate(&self) -> PoolResult<()> {
        if self.base_city.trim().is_empty() {
            return Err(PoolError::Validation("base city is required".to_string()));
        }
        if self.end_date < self.start_date {
            return Err(PoolError::Validation(format!(
                "trip ends ({}) before it starts ({})",
                self.end_date, self.start_date
            )));
        }
        Ok(())
    }

    /// Inclusive number of days shared with `[start, end]`, zero if disjoint.
    pub fn overlap_days(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        let from = self.start_date.max(start);
        let to = self.end_date.min(end);
        if to < from {
            0
        } else {
            (to - from).num_days() + 1
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub user_id: String,
    pub email: Option<Masked<String>>,
    pub is_creator: bool,
    pub joined_at: DateTime<Utc>,
}

/// A concrete itinerary a member attached to the group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedTrip {
    pub trip_id: String,
    pub trip_data: serde_json::Value,
    pub saved_by: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: String,
    pub members: Vec<GroupMember>,
    pub capacity: Capacity,
    pub visibility: Visibility,
    pub status: GroupStatus,
    pub trip: TripAttributes,
    pub saved_trip: Option<SavedTrip>,
    pub closed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// The creator is always the first roster member.
    pub fn new(
        name: String,
        description: Option<String>,
        creator: &Identity,
        capacity: Capacity,
        visibility: Visibility,
        trip: TripAttributes,
        now: DateTime<Utc>,
    ) -> PoolResult<Self> {
        if name.trim().is_empty() {
            return Err(PoolError::Validation("group name is required".to_string()));
        }
        trip.validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            name,
            description,
            creator_id: creator.user_id.clone(),
            members: vec![GroupMember {
                user_id: creator.user_id.clone(),
                email: Some(creator.email.clone()),
                is_creator: true,
                joined_at: now,
            }],
            capacity,
            visibility,
            status: GroupStatus::Open,
            trip,
            saved_trip: None,
            closed_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    pub fn is_creator(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }

    /// Same creator, name, city and dates while still recruiting: a second
    /// delivery of the same create request.
    pub fn repeats(&self, other: &Group) -> bool {
        self.status == GroupStatus::Open
            && self.creator_id == other.creator_id
            && self.name.trim().eq_ignore_ascii_case(other.name.trim())
            && self.trip.base_city.trim().eq_ignore_ascii_case(other.trip.base_city.trim())
            && self.trip.start_date == other.trip.start_date
            && self.trip.end_date == other.trip.end_date
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.user_id.clone()).collect()
    }

    pub fn roster_size(&self) -> u32 {
        self.members.len() as u32
    }

    pub fn spots_left(&self) -> u32 {
        self.capacity.max_members.saturating_sub(self.roster_size())
    }

    pub fn is_full(&self) -> bool {
        self.spots_left() == 0
    }

    pub fn scope(&self) -> String {
        format!("group {}", self.id)
    }

    pub fn ensure_member(&self, user_id: &str) -> PoolResult<()> {
        if self.is_member(user_id) {
            Ok(())
        } else {
            Err(PoolError::NotAMember {
                scope: self.scope(),
                user_id: user_id.to_string(),
            })
        }
    }

    pub fn ensure_creator(&self, user_id: &str) -> PoolResult<()> {
        if self.is_creator(user_id) {
            Ok(())
        } else {
            Err(PoolError::Forbidden(format!(
                "only the creator of {} may do this",
                self.scope()
            )))
        }
    }

    /// Roster admission. Capacity is checked here so that whoever applies
    /// this under the group's lock can never overfill the roster.
    fn admit(&mut self, user_id: String, email: Option<Masked<String>>, now: DateTime<Utc>) -> PoolResult<()> {
        if self.status == GroupStatus::Closed {
            return Err(PoolError::Conflict(format!("{} is closed", self.scope())));
        }
        if self.is_member(&user_id) {
            return Err(PoolError::Conflict(format!(
                "{} is already a member of {}",
                user_id,
                self.scope()
            )));
        }
        if self.is_full() {
            return Err(PoolError::CapacityExceeded {
                scope: self.scope(),
                max_members: self.capacity.max_members,
            });
        }

        self.members.push(GroupMember {
            user_id,
            email,
            is_creator: false,
            joined_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Open → Active
    fn finalize(&mut self, actor: &str, now: DateTime<Utc>) -> PoolResult<()> {
        self.ensure_creator(actor)?;
        if self.status != GroupStatus::Open {
            return Err(PoolError::InvalidTransition {
                from: format!("{:?}", self.status),
                to: "ACTIVE".to_string(),
            });
        }
        self.status = GroupStatus::Active;
        self.updated_at = now;
        Ok(())
    }

    /// Open | Active → Closed
    fn close(&mut self, actor: &str, reason: Option<String>, now: DateTime<Utc>) -> PoolResult<()> {
        self.ensure_creator(actor)?;
        if self.status == GroupStatus::Closed {
            return Err(PoolError::InvalidTransition {
                from: format!("{:?}", self.status),
                to: "CLOSED".to_string(),
            });
        }
        self.status = GroupStatus::Closed;
        self.closed_reason = reason;
        self.updated_at = now;
        Ok(())
    }

    fn save_trip(&mut self, actor: &str, trip_id: String, trip_data: serde_json::Value, now: DateTime<Utc>) -> PoolResult<()> {
        self.ensure_member(actor)?;
        if trip_id.trim().is_empty() {
            return Err(PoolError::Validation("trip id is required".to_string()));
        }
        self.saved_trip = Some(SavedTrip {
            trip_id,
            trip_data,
            saved_by: actor.to_string(),
            saved_at: now,
        });
        self.updated_at = now;
        Ok(())
    }
}

/// A mutation of a group, applied atomically by the repository.
#[derive(Debug, Clone)]
pub enum GroupChange {
    Admit {
        user_id: String,
        email: Option<Masked<String>>,
    },
    Finalize {
        actor: String,
    },
    Close {
        actor: String,
        reason: Option<String>,
    },
    SaveTrip {
        actor: String,
        trip_id: String,
        trip_data: serde_json::Value,
    },
}

impl GroupChange {
    pub fn apply_to(self, group: &mut Group, now: DateTime<Utc>) -> PoolResult<()> {
        match self {
            GroupChange::Admit { user_id, email } => group.admit(user_id, email, now),
            GroupChange::Finalize { actor } => group.finalize(&actor, now),
            GroupChange::Close { actor, reason } => group.close(&actor, reason, now),
            GroupChange::SaveTrip {
                actor,
                trip_id,
                trip_data,
            } => group.save_trip(&actor, trip_id, trip_data, now),
        }
    }
}

/// Normalized listing record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
    pub creator_id: String,
    pub member_count: u32,
    pub min_members: u32,
    pub max_members: u32,
    pub spots_left: u32,
    pub visibility: Visibility,
    pub status: GroupStatus,
    pub base_city: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget_level: BudgetLevel,
    pub preferred_activities: Vec<String>,
    pub preferred_terrains: Vec<String>,
    pub is_member: bool,
    pub is_creator: bool,
}

impl GroupSummary {
    pub fn from_group(group: &Group, viewer: Option<&str>) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            creator_id: group.creator_id.clone(),
            member_count: group.roster_size(),
            min_members: group.capacity.min_members,
            max_members: group.capacity.max_members,
            spots_left: group.spots_left(),
            visibility: group.visibility,
            status: group.status,
            base_city: group.trip.base_city.clone(),
            start_date: group.trip.start_date,
            end_date: group.trip.end_date,
            budget_level: group.trip.budget_level,
            preferred_activities: group.trip.preferred_activities.clone(),
            preferred_terrains: group.trip.preferred_terrains.clone(),
            is_member: viewer.map(|v| group.is_member(v)).unwrap_or(false),
            is_creator: viewer.map(|v| group.is_creator(v)).unwrap_or(false),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn trip(city: &str) -> TripAttributes {
        TripAttributes {
            base_city: city.to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 6, 10).unwrap(),
            budget_level: BudgetLevel::Moderate,
            preferred_terrains: vec!["mountains".to_string()],
            preferred_activities: vec!["hiking".to_string(), "food".to_string()],
        }
    }

    pub fn group(creator: &str, max_members: u32) -> Group {
        Group::new(
            format!("{}'s trip", creator),
            None,
            &Identity::new(creator, format!("{}@example.com", creator)),
            Capacity::new(2, max_members).unwrap(),
            Visibility::Public,
            trip("Lisbon"),
            Utc::now(),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use pooling_core::ErrorKind;

    fn admit(group: &mut Group, user: &str) -> PoolResult<()> {
        GroupChange::Admit {
            user_id: user.to_string(),
            email: None,
        }
        .apply_to(group, Utc::now())
    }

    #[test]
    fn test_creator_is_first_member() {
        let group = group("ana", 4);
        assert!(group.is_member("ana"));
        assert!(group.members[0].is_creator);
        assert_eq!(group.roster_size(), 1);
    }

    #[test]
    fn test_admission_respects_capacity() {
        let mut group = group("ana", 2);
        admit(&mut group, "bob").unwrap();
        assert!(group.is_full());

        let err = admit(&mut group, "cy").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(group.roster_size(), 2);
    }

    #[test]
    fn test_duplicate_admission_is_conflict() {
        let mut group = group("ana", 4);
        let err = admit(&mut group, "ana").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_only_creator_finalizes() {
        let mut group = group("ana", 4);
        admit(&mut group, "bob").unwrap();

        let err = GroupChange::Finalize { actor: "bob".to_string() }
            .apply_to(&mut group, Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        GroupChange::Finalize { actor: "ana".to_string() }
            .apply_to(&mut group, Utc::now())
            .unwrap();
        assert_eq!(group.status, GroupStatus::Active);

        let err = GroupChange::Finalize { actor: "ana".to_string() }
            .apply_to(&mut group, Utc::now())
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidTransition { .. }));
    }

    #[test]
    fn test_invalid_capacity_rejected() {
        assert!(Capacity::new(0, 4).is_err());
        assert!(Capacity::new(5, 4).is_err());
        assert!(Capacity::new(4, 4).is_ok());
    }

    #[test]
    fn test_overlap_days() {
        let trip = trip("Porto");
        let d = |m, day| NaiveDate::from_ymd_opt(2026, m, day).unwrap();
        assert_eq!(trip.overlap_days(d(6, 8), d(6, 20)), 3);
        assert_eq!(trip.overlap_days(d(7, 1), d(7, 5)), 0);
    }
}
