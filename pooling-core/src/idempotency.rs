use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::{Clock, PoolError, PoolResult};

/// Detects repeated delivery of a mutating call.
#[async_trait]
pub trait IdempotencyGuard: Send + Sync {
    /// Returns `true` if the key was free and is now held for `ttl_seconds`.
    async fn claim(&self, key: &str, ttl_seconds: u64) -> PoolResult<bool>;

    /// Free a key after a failed attempt so the caller may retry.
    async fn release(&self, key: &str) -> PoolResult<()>;
}

/// Claim a key or fail with `Conflict`.
pub async fn claim_or_conflict(
    guard: &dyn IdempotencyGuard,
    key: &str,
    ttl_seconds: u64,
) -> PoolResult<()> {
    if guard.claim(key, ttl_seconds).await? {
        Ok(())
    } else {
        tracing::warn!("Rejected repeated delivery for idempotency key {}", key);
        Err(PoolError::Conflict(format!(
            "request with idempotency key {} was already applied",
            key
        )))
    }
}

const MAX_TTL_SECONDS: u64 = 10 * 365 * 86_400;

/// Process-local guard. Expired keys are dropped whenever a new key is claimed.
pub struct InMemoryIdempotencyGuard {
    clock: Arc<dyn Clock>,
    keys: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryIdempotencyGuard {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            keys: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl IdempotencyGuard for InMemoryIdempotencyGuard {
    async fn claim(&self, key: &str, ttl_seconds: u64) -> PoolResult<bool> {
        let now = self.clock.now();
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);

        keys.retain(|_, expires_at| *expires_at > now);
        if keys.contains_key(key) {
            return Ok(false);
        }
        let ttl = Duration::seconds(ttl_seconds.min(MAX_TTL_SECONDS) as i64);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        keys.insert(key.to_string(), expires_at);
        Ok(true)
    }

    async fn release(&self, key: &str) -> PoolResult<()> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, ManualClock};

    #[tokio::test]
    async fn test_key_claimed_once_until_ttl() {
        let clock = Arc::new(ManualClock::default());
        let guard = InMemoryIdempotencyGuard::new(clock.clone());

        assert!(guard.claim("pay:1", 60).await.unwrap());
        assert!(!guard.claim("pay:1", 60).await.unwrap());

        clock.advance(Duration::seconds(61));
        assert!(guard.claim("pay:1", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_keys_are_dropped_on_claim() {
        let clock = Arc::new(ManualClock::default());
        let guard = InMemoryIdempotencyGuard::new(clock.clone());
        for n in 0..5 {
            guard.claim(&format!("request:{}", n), 60).await.unwrap();
        }
        guard.claim("long-lived", 3_600).await.unwrap();

        clock.advance(Duration::seconds(61));
        assert!(guard.claim("fresh", 60).await.unwrap());

        let held = guard.keys.lock().unwrap().len();
        assert_eq!(held, 2);
        assert!(!guard.claim("long-lived", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let guard = InMemoryIdempotencyGuard::new(Arc::new(ManualClock::default()));
        assert!(guard.claim("forever", u64::MAX).await.unwrap());
        assert!(!guard.claim("forever", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_released_key_can_be_reclaimed() {
        let guard = InMemoryIdempotencyGuard::new(Arc::new(ManualClock::default()));
        claim_or_conflict(&guard, "vote:1", 60).await.unwrap();

        let err = claim_or_conflict(&guard, "vote:1", 60).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        guard.release("vote:1").await.unwrap();
        assert!(claim_or_conflict(&guard, "vote:1", 60).await.is_ok());
    }
}
