use pooling_core::{Clock, Identity, PoolError, PoolResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::filters::GroupFilters;
use crate::group::{Capacity, Group, GroupChange, GroupSummary, TripAttributes, Visibility};
use crate::precheck::{score_candidates, CompatibleGroup, TripPreferences};
use crate::repository::{require_group, GroupRepository};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    pub name: String,
    pub description: Option<String>,
    pub min_members: u32,
    pub max_members: u32,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
    pub trip: TripAttributes,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupAction {
    Finalize,
    Cancel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedTripOutcome {
    pub group: GroupSummary,
    pub suggestions: Vec<CompatibleGroup>,
}

/// Creator and member actions on a group's own record.
pub struct GroupAdmin {
    repo: Arc<dyn GroupRepository>,
    clock: Arc<dyn Clock>,
}

impl GroupAdmin {
    pub fn new(repo: Arc<dyn GroupRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub async fn create_group_with_trip(&self, identity: &Identity, request: NewGroup) -> PoolResult<Group> {
        let capacity = Capacity::new(request.min_members, request.max_members)?;
        let group = Group::new(
            request.name,
            request.description,
            identity,
            capacity,
            request.visibility,
            request.trip,
            self.clock.now(),
        )?;

        self.repo.create_group(&group).await?;
        tracing::info!(
            "Group {} created by {} ({}-{} members)",
            group.id,
            identity.user_id,
            capacity.min_members,
            capacity.max_members
        );
        Ok(group)
    }

    /// Attach a trip to the group and suggest other open groups travelling
    /// to the same place at the same time.
    pub async fn save_trip(
        &self,
        identity: &Identity,
        group_id: Uuid,
        trip_id: String,
        trip_data: serde_json::Value,
    ) -> PoolResult<SavedTripOutcome> {
        let change = GroupChange::SaveTrip {
            actor: identity.user_id.clone(),
            trip_id,
            trip_data,
        };
        let group = self.repo.apply_change(group_id, change, self.clock.now()).await?;

        let preferences = TripPreferences {
            base_city: group.trip.base_city.clone(),
            start_date: group.trip.start_date,
            end_date: group.trip.end_date,
            budget_level: Some(group.trip.budget_level),
            preferred_activities: group.trip.preferred_activities.clone(),
            preferred_terrains: group.trip.preferred_terrains.clone(),
        };
        let others: Vec<Group> = self
            .repo
            .list_public(&GroupFilters::default())
            .await?
            .into_iter()
            .filter(|g| g.id != group.id)
            .collect();
        let suggestions = score_candidates(&others, &preferences, Some(&identity.user_id));

        tracing::info!(
            "Trip saved on group {} by {}, {} suggestions",
            group.id,
            identity.user_id,
            suggestions.len()
        );
        Ok(SavedTripOutcome {
            group: GroupSummary::from_group(&group, Some(&identity.user_id)),
            suggestions,
        })
    }

    pub async fn finalize(
        &self,
        identity: &Identity,
        group_id: Uuid,
        action: GroupAction,
        reason: Option<String>,
    ) -> PoolResult<Group> {
        // Surface NotFound before the creator check.
        require_group(self.repo.as_ref(), group_id).await?;

        let actor = identity.user_id.clone();
        let change = match action {
            GroupAction::Finalize => GroupChange::Finalize { actor },
            GroupAction::Cancel => GroupChange::Close { actor, reason },
        };
        let group = self.repo.apply_change(group_id, change, self.clock.now()).await?;
        tracing::info!("Group {} moved to {:?} by {}", group.id, group.status, identity.user_id);
        Ok(group)
    }

    pub async fn get_group(&self, group_id: Uuid) -> PoolResult<Group> {
        require_group(self.repo.as_ref(), group_id).await
    }
}

impl std::str::FromStr for GroupAction {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "finalize" => Ok(GroupAction::Finalize),
            "cancel" => Ok(GroupAction::Cancel),
            other => Err(PoolError::Validation(format!("unknown group action: {}", other))),
        }
    }
}
