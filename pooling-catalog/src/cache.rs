use chrono::{DateTime, Duration, Utc};
use pooling_core::Clock;
use std::sync::Arc;

/// Single-value cache with a time-to-live, owned by one catalog.
pub struct TtlCache<T> {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    value: Option<T>,
    fetched_at: Option<DateTime<Utc>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            value: None,
            fetched_at: None,
        }
    }

    /// The cached value if it was stored less than `ttl` ago.
    pub fn fresh(&self) -> Option<T> {
        let fetched_at = self.fetched_at?;
        if self.clock.now() - fetched_at < self.ttl {
            self.value.clone()
        } else {
            None
        }
    }

    /// The last stored value regardless of age.
    pub fn last(&self) -> Option<T> {
        self.value.clone()
    }

    pub fn store(&mut self, value: T) {
        self.value = Some(value);
        self.fetched_at = Some(self.clock.now());
    }

    pub fn clear(&mut self) {
        self.value = None;
        self.fetched_at = None;
    }
}
