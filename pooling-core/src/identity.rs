use async_trait::async_trait;
use pooling_shared::pii::Masked;
use serde::{Deserialize, Serialize};

use crate::{PoolError, PoolResult};

/// A caller as vouched for by the external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Masked<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: Masked::new(email.into()),
        }
    }

    /// Rejects requests whose body claims to act for a different user.
    pub fn ensure_is(&self, claimed_user_id: Option<&str>) -> PoolResult<()> {
        match claimed_user_id {
            Some(claimed) if claimed != self.user_id => Err(PoolError::Forbidden(format!(
                "caller {} cannot act as {}",
                self.user_id, claimed
            ))),
            _ => Ok(()),
        }
    }
}

/// Every mutating call needs an identity; a missing one is an auth failure.
pub fn require_identity(identity: Option<&Identity>) -> PoolResult<&Identity> {
    identity.ok_or_else(|| PoolError::Auth("no resolvable identity for caller".to_string()))
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer credential to a verified user id and email.
    async fn resolve(&self, credential: &str) -> PoolResult<Identity>;
}

/// Provider backed by a fixed table, for tests and local runs.
pub struct StaticIdentityProvider {
    identities: Vec<(String, Identity)>,
}

impl StaticIdentityProvider {
    pub fn new(identities: Vec<(String, Identity)>) -> Self {
        Self { identities }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, credential: &str) -> PoolResult<Identity> {
        tracing::debug!("Resolving static identity credential");
        self.identities
            .iter()
            .find(|(token, _)| token == credential)
            .map(|(_, identity)| identity.clone())
            .ok_or_else(|| PoolError::Auth("unknown credential".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn test_static_provider_resolves_known_token() {
        let provider = StaticIdentityProvider::new(vec![(
            "token-ana".to_string(),
            Identity::new("ana", "ana@example.com"),
        )]);

        let identity = provider.resolve("token-ana").await.unwrap();
        assert_eq!(identity.user_id, "ana");

        let err = provider.resolve("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[test]
    fn test_missing_identity_is_auth_error() {
        let err = require_identity(None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[test]
    fn test_body_user_must_match_identity() {
        let identity = Identity::new("ana", "ana@example.com");
        assert!(identity.ensure_is(Some("ana")).is_ok());
        assert!(identity.ensure_is(None).is_ok());
        assert_eq!(
            identity.ensure_is(Some("bob")).unwrap_err().kind(),
            ErrorKind::Forbidden
        );
    }
}
