use std::future::Future;
use std::time::Duration;

use crate::PoolResult;

/// Repeat a read while it fails with a transient error.
///
/// Never wrap mutating calls in this: a lost response does not mean the
/// write was not applied.
pub async fn retry_read<T, F, Fut>(attempts: u32, backoff: Duration, mut read: F) -> PoolResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PoolResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match read().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::debug!("Read attempt {}/{} failed: {}", attempt, attempts, e);
                attempt += 1;
                tokio::time::sleep(backoff * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}
