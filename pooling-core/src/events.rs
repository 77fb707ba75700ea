use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

use crate::PoolResult;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> PoolResult<()>;
}

/// Serialize and publish a domain event. Failures are logged and swallowed:
/// the state change has already been recorded.
pub async fn emit<E: Serialize>(publisher: &dyn EventPublisher, topic: &str, key: &str, event: &E) {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!("Failed to serialize event for {}: {}", topic, e);
            return;
        }
    };

    if let Err(e) = publisher.publish(topic, key, &payload).await {
        tracing::warn!("Event publish to {} failed for {}: {}", topic, key, e);
    }
}

/// Keeps every published event in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, String, String)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, String, String)> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count_on(&self, topic: &str) -> usize {
        self.published().iter().filter(|(t, _, _)| t == topic).count()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> PoolResult<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_string(), key.to_string(), payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PoolError;

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _topic: &str, _key: &str, _payload: &str) -> PoolResult<()> {
            Err(PoolError::Network("broker down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_emit_records_json_payload() {
        let publisher = RecordingPublisher::new();
        emit(&publisher, "pooling.test", "k1", &serde_json::json!({"status": "APPROVED"})).await;

        let events = publisher.published();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].2, r#"{"status":"APPROVED"}"#);
        assert_eq!(publisher.count_on("pooling.test"), 1);
    }

    #[tokio::test]
    async fn test_emit_swallows_publish_failure() {
        emit(&FailingPublisher, "pooling.test", "k1", &serde_json::json!({})).await;
    }
}
