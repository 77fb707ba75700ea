use pooling_membership::JoinRejectionPolicy;
use pooling_trip::DecisionPolicy;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub pooling: PoolingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

/// Business rules for pooling. Every field has a default so a config file
/// only names what it changes.
#[derive(Debug, Deserialize, Clone)]
pub struct PoolingRules {
    #[serde(default = "default_invitation_expiration_days")]
    pub invitation_expiration_days: u32,
    #[serde(default = "default_catalog_cache_ttl_seconds")]
    pub catalog_cache_ttl_seconds: u64,
    #[serde(default = "default_read_retry_attempts")]
    pub read_retry_attempts: u32,
    #[serde(default)]
    pub join_rejection: JoinRejectionPolicy,
    #[serde(default = "default_partial_payment_grace_hours")]
    pub partial_payment_grace_hours: u32,
    #[serde(default = "default_cancellation_penalty_percent")]
    pub cancellation_penalty_percent: u32,
    #[serde(default = "default_idempotency_ttl_seconds")]
    pub idempotency_ttl_seconds: u64,
    #[serde(default = "default_expiry_sweep_seconds")]
    pub expiry_sweep_seconds: u64,
    #[serde(default)]
    pub decision: DecisionPolicy,
}

fn default_invitation_expiration_days() -> u32 { 7 }
fn default_catalog_cache_ttl_seconds() -> u64 { 300 }
fn default_read_retry_attempts() -> u32 { 2 }
fn default_partial_payment_grace_hours() -> u32 { 24 }
fn default_cancellation_penalty_percent() -> u32 { 20 }
fn default_idempotency_ttl_seconds() -> u64 { 86_400 }
fn default_expiry_sweep_seconds() -> u64 { 60 }

impl Default for PoolingRules {
    fn default() -> Self {
        Self {
            invitation_expiration_days: default_invitation_expiration_days(),
            catalog_cache_ttl_seconds: default_catalog_cache_ttl_seconds(),
            read_retry_attempts: default_read_retry_attempts(),
            join_rejection: JoinRejectionPolicy::default(),
            partial_payment_grace_hours: default_partial_payment_grace_hours(),
            cancellation_penalty_percent: default_cancellation_penalty_percent(),
            idempotency_ttl_seconds: default_idempotency_ttl_seconds(),
            expiry_sweep_seconds: default_expiry_sweep_seconds(),
            decision: DecisionPolicy::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. POOLING__AUTH__JWT_SECRET=... or POOLING__POOLING__JOIN_REJECTION=fail_fast
            .add_source(config::Environment::with_prefix("POOLING").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
