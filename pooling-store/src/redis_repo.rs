use async_trait::async_trait;
use pooling_core::idempotency::IdempotencyGuard;
use pooling_core::{PoolError, PoolResult};
use redis::{AsyncCommands, RedisResult};
use tracing::info;

/// Shared Redis access: idempotency keys and per-caller rate limits.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis client configured");
        Ok(Self { client })
    }

    fn idempotency_key(key: &str) -> String {
        format!("idem:{}", key)
    }

    pub async fn claim_key(&self, key: &str, ttl_seconds: u64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // SET NX: only the first delivery wins until the TTL lapses
        let result: Option<String> = redis::cmd("SET")
            .arg(Self::idempotency_key(key))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    pub async fn release_key(&self, key: &str) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del(Self::idempotency_key(key)).await
    }

    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

fn transport(e: redis::RedisError) -> PoolError {
    tracing::error!("Redis call failed: {}", e);
    PoolError::Network(format!("redis: {}", e))
}

#[async_trait]
impl IdempotencyGuard for RedisClient {
    async fn claim(&self, key: &str, ttl_seconds: u64) -> PoolResult<bool> {
        self.claim_key(key, ttl_seconds).await.map_err(transport)
    }

    async fn release(&self, key: &str) -> PoolResult<()> {
        self.release_key(key).await.map_err(transport)
    }
}
