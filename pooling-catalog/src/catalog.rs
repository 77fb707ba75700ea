use chrono::Duration;
use pooling_core::retry::retry_read;
use pooling_core::{Clock, PoolResult};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cache::TtlCache;
use crate::filters::GroupFilters;
use crate::group::GroupSummary;
use crate::precheck::{score_candidates, CompatibleGroup, TripPreferences};
use crate::repository::GroupRepository;

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub cache_ttl: Duration,
    /// Total attempts for a listing read, including the first.
    pub read_attempts: u32,
    pub retry_backoff: std::time::Duration,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::minutes(5),
            read_attempts: 2,
            retry_backoff: std::time::Duration::from_millis(200),
        }
    }
}

/// Read side of the group store for one viewer session. Each session owns
/// its catalog, so cached listings are never shared between users.
pub struct GroupCatalog {
    repo: Arc<dyn GroupRepository>,
    settings: CatalogSettings,
    viewer: Option<String>,
    cache: Mutex<TtlCache<Vec<GroupSummary>>>,
}

impl GroupCatalog {
    pub fn new(
        repo: Arc<dyn GroupRepository>,
        clock: Arc<dyn Clock>,
        settings: CatalogSettings,
        viewer: Option<String>,
    ) -> Self {
        let cache = TtlCache::new(clock, settings.cache_ttl);
        Self {
            repo,
            settings,
            viewer,
            cache: Mutex::new(cache),
        }
    }

    pub fn viewer(&self) -> Option<&str> {
        self.viewer.as_deref()
    }

    /// Filtered listing of public groups, normalized for display.
    pub async fn list_enhanced(&self, filters: &GroupFilters) -> PoolResult<Vec<GroupSummary>> {
        let viewer = filters.user_id.as_deref().or(self.viewer());
        let groups = retry_read(self.settings.read_attempts, self.settings.retry_backoff, || {
            self.repo.list_public(filters)
        })
        .await?;

        tracing::debug!("Listed {} public groups", groups.len());
        Ok(groups
            .iter()
            .map(|g| GroupSummary::from_group(g, viewer))
            .collect())
    }

    /// The store already filters by creator; results are passed through as-is.
    pub async fn list_created_by(&self, user_id: &str) -> PoolResult<Vec<GroupSummary>> {
        let groups = retry_read(self.settings.read_attempts, self.settings.retry_backoff, || {
            self.repo.list_created_by(user_id)
        })
        .await?;

        Ok(groups
            .iter()
            .map(|g| GroupSummary::from_group(g, Some(user_id)))
            .collect())
    }

    /// Unfiltered listing served from the cache while it is fresh. A failed
    /// refresh falls back to the previous listing when there is one.
    pub async fn get_cached(&self, force_refresh: bool) -> PoolResult<Vec<GroupSummary>> {
        // Held across the fetch so concurrent callers share one refresh.
        let mut cache = self.cache.lock().await;

        if !force_refresh {
            if let Some(groups) = cache.fresh() {
                return Ok(groups);
            }
        }

        match self.list_enhanced(&GroupFilters::default()).await {
            Ok(groups) => {
                cache.store(groups.clone());
                Ok(groups)
            }
            Err(e) => match cache.last() {
                Some(stale) => {
                    tracing::warn!("Group listing refresh failed, serving stale listing: {}", e);
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    /// Open public groups compatible with the given preferences, best first.
    pub async fn precheck(&self, preferences: &TripPreferences) -> PoolResult<Vec<CompatibleGroup>> {
        preferences.validate()?;
        let everything = GroupFilters::default();
        let groups = retry_read(self.settings.read_attempts, self.settings.retry_backoff, || {
            self.repo.list_public(&everything)
        })
        .await?;

        Ok(score_candidates(&groups, preferences, self.viewer()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::fixtures::group;
    use crate::group::{Group, GroupChange};
    use crate::repository::InMemoryGroupRepository;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use pooling_core::{ErrorKind, ManualClock, PoolError};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use uuid::Uuid;

    /// Counts listing fetches and fails them on demand.
    struct FlakyRepository {
        inner: InMemoryGroupRepository,
        fetches: AtomicU32,
        failing: AtomicBool,
    }

    impl FlakyRepository {
        fn new() -> Self {
            Self {
                inner: InMemoryGroupRepository::new(),
                fetches: AtomicU32::new(0),
                failing: AtomicBool::new(false),
            }
        }

        fn fetches(&self) -> u32 {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GroupRepository for FlakyRepository {
        async fn create_group(&self, group: &Group) -> PoolResult<Uuid> {
            self.inner.create_group(group).await
        }

        async fn get_group(&self, id: Uuid) -> PoolResult<Option<Group>> {
            self.inner.get_group(id).await
        }

        async fn list_public(&self, filters: &GroupFilters) -> PoolResult<Vec<Group>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(PoolError::Network("connection reset".to_string()));
            }
            self.inner.list_public(filters).await
        }

        async fn list_created_by(&self, creator_id: &str) -> PoolResult<Vec<Group>> {
            self.inner.list_created_by(creator_id).await
        }

        async fn apply_change(&self, id: Uuid, change: GroupChange, at: DateTime<Utc>) -> PoolResult<Group> {
            self.inner.apply_change(id, change, at).await
        }
    }

    fn catalog(repo: Arc<FlakyRepository>, clock: Arc<ManualClock>) -> GroupCatalog {
        let settings = CatalogSettings {
            read_attempts: 1,
            retry_backoff: std::time::Duration::from_millis(1),
            ..Default::default()
        };
        GroupCatalog::new(repo, clock, settings, Some("ana".to_string()))
    }

    #[tokio::test]
    async fn test_cached_listing_fetched_once_within_ttl() {
        let repo = Arc::new(FlakyRepository::new());
        let clock = Arc::new(ManualClock::default());
        repo.create_group(&group("ana", 4)).await.unwrap();
        let catalog = catalog(repo.clone(), clock.clone());

        catalog.get_cached(false).await.unwrap();
        clock.advance(Duration::minutes(4));
        catalog.get_cached(false).await.unwrap();
        assert_eq!(repo.fetches(), 1);

        clock.advance(Duration::minutes(2));
        catalog.get_cached(false).await.unwrap();
        assert_eq!(repo.fetches(), 2);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_fetch() {
        let repo = Arc::new(FlakyRepository::new());
        let catalog = catalog(repo.clone(), Arc::new(ManualClock::default()));

        catalog.get_cached(false).await.unwrap();
        catalog.clear_cache().await;
        catalog.get_cached(false).await.unwrap();
        assert_eq!(repo.fetches(), 2);

        catalog.get_cached(true).await.unwrap();
        assert_eq!(repo.fetches(), 3);
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_stale_listing() {
        let repo = Arc::new(FlakyRepository::new());
        repo.create_group(&group("ana", 4)).await.unwrap();
        let catalog = catalog(repo.clone(), Arc::new(ManualClock::default()));

        let first = catalog.get_cached(false).await.unwrap();
        repo.failing.store(true, Ordering::SeqCst);

        let stale = catalog.get_cached(true).await.unwrap();
        assert_eq!(stale, first);
        assert!(stale[0].is_member && stale[0].is_creator);
    }

    #[tokio::test]
    async fn test_failed_first_fetch_propagates() {
        let repo = Arc::new(FlakyRepository::new());
        repo.failing.store(true, Ordering::SeqCst);
        let catalog = catalog(repo, Arc::new(ManualClock::default()));

        let err = catalog.get_cached(false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_transient_listing_failure_is_retried() {
        let repo = Arc::new(FlakyRepository::new());
        repo.failing.store(true, Ordering::SeqCst);
        let settings = CatalogSettings {
            read_attempts: 3,
            retry_backoff: std::time::Duration::from_millis(1),
            ..Default::default()
        };
        let catalog = GroupCatalog::new(repo.clone(), Arc::new(ManualClock::default()), settings, None);

        assert!(catalog.list_enhanced(&GroupFilters::default()).await.is_err());
        assert_eq!(repo.fetches(), 3);
    }

    #[tokio::test]
    async fn test_precheck_reads_through_repository() {
        let repo = Arc::new(FlakyRepository::new());
        repo.create_group(&group("bob", 6)).await.unwrap();
        let catalog = catalog(repo.clone(), Arc::new(ManualClock::default()));

        let preferences = TripPreferences {
            base_city: "lisbon".to_string(),
            start_date: chrono::NaiveDate::from_ymd_opt(2026, 6, 5).unwrap(),
            end_date: chrono::NaiveDate::from_ymd_opt(2026, 6, 12).unwrap(),
            budget_level: None,
            preferred_activities: vec!["Food".to_string()],
            preferred_terrains: vec![],
        };
        let matches = catalog.precheck(&preferences).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].overlap_days, 6);
        assert_eq!(repo.fetches(), 1);
    }
}
