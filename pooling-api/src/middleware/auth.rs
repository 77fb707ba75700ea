use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use pooling_core::identity::require_identity;
use pooling_core::{Identity, IdentityProvider, PoolError, PoolResult};
use serde::{Deserialize, Serialize};

use crate::error::FacadeError;
use crate::state::{AppState, AuthConfig};

const REQUESTS_PER_MINUTE: i64 = 120;

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims issued by the external identity provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

pub struct JwtIdentityProvider {
    secret: String,
}

impl JwtIdentityProvider {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn resolve(&self, credential: &str) -> PoolResult<Identity> {
        let token_data = decode::<Claims>(
            credential,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| PoolError::Auth(format!("invalid token: {}", e)))?;

        Ok(Identity::new(token_data.claims.sub, token_data.claims.email))
    }
}

/// Sign a token the way the identity provider would. Used by local tooling
/// and tests.
pub fn issue_token(auth: &AuthConfig, user_id: &str, email: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: (Utc::now() + Duration::seconds(auth.expiration as i64)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
}

// ============================================================================
// Identity Middleware
// ============================================================================

/// Resolve the bearer token to an `Identity` and put it in the request
/// extensions. Every pooling route sits behind this.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, FacadeError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let identity = match token {
        Some(token) => Some(
            state
                .identity
                .resolve(token)
                .await
                .map_err(FacadeError::during("authenticate"))?,
        ),
        None => None,
    };
    let identity = require_identity(identity.as_ref())
        .map_err(FacadeError::during("authenticate"))?
        .clone();

    if let Some(redis) = &state.redis {
        let key = format!("ratelimit:{}", identity.user_id);
        match redis.check_rate_limit(&key, REQUESTS_PER_MINUTE, 60).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(FacadeError::new(
                    "rate_limit",
                    PoolError::Conflict(format!("rate limit exceeded for {}", identity.user_id)),
                ))
            }
            // fail open
            Err(e) => tracing::warn!("Rate limit check failed: {}", e),
        }
    }

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pooling_core::ErrorKind;

    fn auth() -> AuthConfig {
        AuthConfig {
            secret: "unit-test-secret".to_string(),
            expiration: 600,
        }
    }

    #[tokio::test]
    async fn test_issued_token_resolves_to_identity() {
        let token = issue_token(&auth(), "ana", "ana@example.com").unwrap();
        let provider = JwtIdentityProvider::new(auth().secret);

        let identity = provider.resolve(&token).await.unwrap();
        assert_eq!(identity.user_id, "ana");
        assert!(identity.email.matches_email("ana@example.com"));
    }

    #[tokio::test]
    async fn test_foreign_signature_is_auth_error() {
        let token = issue_token(&auth(), "ana", "ana@example.com").unwrap();
        let provider = JwtIdentityProvider::new("another-secret".to_string());

        let err = provider.resolve(&token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}
