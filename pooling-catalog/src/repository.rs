use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pooling_core::table::EntityTable;
use pooling_core::{PoolError, PoolResult};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::filters::GroupFilters;
use crate::group::{Group, GroupChange, GroupStatus, Visibility};

/// Repository trait for group data access
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Fails with `Conflict` when an open group from the same creator
    /// already has this name, city and dates.
    async fn create_group(&self, group: &Group) -> PoolResult<Uuid>;

    async fn get_group(&self, id: Uuid) -> PoolResult<Option<Group>>;

    /// Public groups that are still recruiting or active.
    async fn list_public(&self, filters: &GroupFilters) -> PoolResult<Vec<Group>>;

    async fn list_created_by(&self, creator_id: &str) -> PoolResult<Vec<Group>>;

    /// Apply a change atomically with respect to other changes to the
    /// same group; returns the updated group.
    async fn apply_change(&self, id: Uuid, change: GroupChange, at: DateTime<Utc>) -> PoolResult<Group>;
}

pub async fn require_group(repo: &dyn GroupRepository, id: Uuid) -> PoolResult<Group> {
    repo.get_group(id)
        .await?
        .ok_or_else(|| PoolError::not_found("Group", id))
}

pub struct InMemoryGroupRepository {
    groups: EntityTable<Group>,
    creation: Mutex<()>,
}

impl InMemoryGroupRepository {
    pub fn new() -> Self {
        Self {
            groups: EntityTable::new("Group"),
            creation: Mutex::new(()),
        }
    }
}

impl Default for InMemoryGroupRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GroupRepository for InMemoryGroupRepository {
    async fn create_group(&self, group: &Group) -> PoolResult<Uuid> {
        let _creating = self.creation.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.groups.filter(|g| g.repeats(group))?.is_empty() {
            return Err(PoolError::Conflict(format!(
                "{} already has an open group named {}",
                group.creator_id, group.name
            )));
        }

        self.groups.insert(group.id, group.clone())?;
        tracing::info!("Created group {} for creator {}", group.id, group.creator_id);
        Ok(group.id)
    }

    async fn get_group(&self, id: Uuid) -> PoolResult<Option<Group>> {
        self.groups.get(&id)
    }

    async fn list_public(&self, filters: &GroupFilters) -> PoolResult<Vec<Group>> {
        let mut groups = self.groups.filter(|g| {
            g.visibility == Visibility::Public && g.status != GroupStatus::Closed && filters.matches(g)
        })?;
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(groups)
    }

    async fn list_created_by(&self, creator_id: &str) -> PoolResult<Vec<Group>> {
        let mut groups = self.groups.filter(|g| g.creator_id == creator_id)?;
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(groups)
    }

    async fn apply_change(&self, id: Uuid, change: GroupChange, at: DateTime<Utc>) -> PoolResult<Group> {
        self.groups.apply(&id, |group| change.apply_to(group, at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::fixtures::group;
    use pooling_core::ErrorKind;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_private_and_closed_groups_are_not_listed() {
        let repo = InMemoryGroupRepository::new();
        let public = group("ana", 4);
        let mut private = group("bob", 4);
        private.visibility = Visibility::Private;
        let mut closed = group("cy", 4);
        closed.status = GroupStatus::Closed;

        for g in [&public, &private, &closed] {
            repo.create_group(g).await.unwrap();
        }

        let listed = repo.list_public(&GroupFilters::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, public.id);
    }

    #[tokio::test]
    async fn test_list_created_by_returns_only_own_groups() {
        let repo = InMemoryGroupRepository::new();
        repo.create_group(&group("ana", 4)).await.unwrap();
        let mut second = group("ana", 6);
        second.name = "ana's second trip".to_string();
        repo.create_group(&second).await.unwrap();
        repo.create_group(&group("bob", 4)).await.unwrap();

        let own = repo.list_created_by("ana").await.unwrap();
        assert_eq!(own.len(), 2);
        assert!(own.iter().all(|g| g.creator_id == "ana"));
    }

    #[tokio::test]
    async fn test_concurrent_admissions_stop_at_capacity() {
        let repo = Arc::new(InMemoryGroupRepository::new());
        let g = group("ana", 2);
        repo.create_group(&g).await.unwrap();
        let id = g.id;

        let admit = |user: &str| {
            let repo = repo.clone();
            let change = GroupChange::Admit {
                user_id: user.to_string(),
                email: None,
            };
            async move { repo.apply_change(id, change, Utc::now()).await }
        };

        let (a, b) = tokio::join!(admit("bob"), admit("cy"));
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::CapacityExceeded);

        let stored = require_group(repo.as_ref(), id).await.unwrap();
        assert_eq!(stored.roster_size(), 2);
    }

    #[tokio::test]
    async fn test_repeated_create_is_conflict_while_open() {
        let repo = InMemoryGroupRepository::new();
        let first = group("ana", 4);
        repo.create_group(&first).await.unwrap();

        let mut again = group("ana", 4);
        again.name = "  ANA'S TRIP ".to_string();
        let err = repo.create_group(&again).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(repo.list_created_by("ana").await.unwrap().len(), 1);

        // once the first is closed the same trip may be posted again
        repo.apply_change(
            first.id,
            GroupChange::Close {
                actor: "ana".to_string(),
                reason: Some("reposting".to_string()),
            },
            Utc::now(),
        )
        .await
        .unwrap();
        repo.create_group(&again).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_group_is_not_found() {
        let repo = InMemoryGroupRepository::new();
        let err = require_group(&repo, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
