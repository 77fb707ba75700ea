use pooling_core::IdentityProvider;
use pooling_store::RedisClient;
use std::sync::Arc;

use crate::facade::PoolFacade;
use crate::middleware::auth::JwtIdentityProvider;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub facade: Arc<PoolFacade>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Per-caller rate limiting; skipped when Redis is not configured.
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(facade: Arc<PoolFacade>, auth: AuthConfig, redis: Option<Arc<RedisClient>>) -> Self {
        Self {
            facade,
            identity: Arc::new(JwtIdentityProvider::new(auth.secret.clone())),
            redis,
            auth,
        }
    }
}
