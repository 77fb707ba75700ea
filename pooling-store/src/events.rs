use async_trait::async_trait;
use pooling_core::events::EventPublisher;
use pooling_core::PoolResult;
use tracing::info;

#[cfg(feature = "kafka")]
pub use kafka::EventProducer;

/// Logs every event instead of shipping it. Used when no broker is configured.
#[derive(Debug, Clone, Default)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> PoolResult<()> {
        info!(topic = topic, key = key, "event {}", payload);
        Ok(())
    }
}

#[cfg(feature = "kafka")]
mod kafka {
    use async_trait::async_trait;
    use pooling_core::events::EventPublisher;
    use pooling_core::{PoolError, PoolResult};
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;
    use std::time::Duration;
    use tracing::{error, info};

    #[derive(Clone)]
    pub struct EventProducer {
        producer: FutureProducer,
    }

    impl EventProducer {
        pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", "5000")
                .create()?;

            Ok(Self { producer })
        }
    }

    #[async_trait]
    impl EventPublisher for EventProducer {
        async fn publish(&self, topic: &str, key: &str, payload: &str) -> PoolResult<()> {
            let record = FutureRecord::to(topic).key(key).payload(payload);

            match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
                Ok(delivery) => {
                    info!(
                        "Sent message to {}/{}: partition {} offset {}",
                        topic, key, delivery.partition, delivery.offset
                    );
                    Ok(())
                }
                Err((e, _msg)) => {
                    error!("Failed to send message to {}: {}", topic, e);
                    Err(PoolError::Network(format!("kafka: {}", e)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pooling_core::events::emit;

    #[tokio::test]
    async fn test_tracing_publisher_never_fails() {
        let publisher = TracingEventPublisher;
        assert!(publisher.publish("pooling.test", "k", "{}").await.is_ok());
        emit(&publisher, "pooling.test", "k", &serde_json::json!({"ok": true})).await;
    }
}
