pub mod app_config;
pub mod redis_repo;
pub mod events;

pub use app_config::Config;
pub use redis_repo::RedisClient;
pub use events::TracingEventPublisher;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
