use anyhow::Context;
use pooling_api::{app, facade::PoolFacade, state::AppState, worker, AuthConfig};
use pooling_core::events::EventPublisher;
use pooling_core::idempotency::{IdempotencyGuard, InMemoryIdempotencyGuard};
use pooling_core::{Clock, SystemClock};
use pooling_store::app_config::Config;
use pooling_store::{RedisClient, TracingEventPublisher};
use pooling_trip::MockPaymentAdapter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pooling_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting pooling API on port {}", config.server.port);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Redis backs idempotency keys and rate limits when configured
    let redis = match &config.redis {
        Some(redis) => Some(Arc::new(
            RedisClient::new(&redis.url)
                .await
                .context("Failed to connect to Redis")?,
        )),
        None => {
            tracing::warn!("No redis configured, idempotency keys are process-local");
            None
        }
    };
    let guard: Arc<dyn IdempotencyGuard> = match &redis {
        Some(redis) => redis.clone(),
        None => Arc::new(InMemoryIdempotencyGuard::new(clock.clone())),
    };

    let events = event_publisher(&config)?;

    let facade = Arc::new(PoolFacade::in_memory(
        &config.pooling,
        guard,
        events,
        Arc::new(MockPaymentAdapter),
        clock,
    ));

    tokio::spawn(worker::start_expiry_worker(
        facade.clone(),
        Duration::from_secs(config.pooling.expiry_sweep_seconds.max(1)),
    ));

    let state = AppState::new(
        facade,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        redis,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn event_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    match &config.kafka {
        Some(kafka) => {
            let producer = pooling_store::EventProducer::new(&kafka.brokers)
                .context("Failed to create Kafka producer")?;
            Ok(Arc::new(producer))
        }
        None => Ok(Arc::new(TracingEventPublisher)),
    }
}

#[cfg(not(feature = "kafka"))]
fn event_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    if config.kafka.is_some() {
        tracing::warn!("Kafka brokers configured but built without the kafka feature, logging events instead");
    }
    Ok(Arc::new(TracingEventPublisher))
}
