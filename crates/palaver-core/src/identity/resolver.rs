//! IdentityResolver -- produces a stable session token for each participant.
//!
//! Resolution order: a previously stored token, then the authenticated
//! principal's id, then a fresh token. Fresh tokens are stored only with
//! consent; anything that cannot be stored is ephemeral. Resolution itself
//! never fails.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use palaver_types::error::ChatError;
use palaver_types::identity::{ResolvedIdentity, SessionContext};

use crate::storage::kv_store::KeyValueStore;

/// Key under which the session token is stored.
pub const SESSION_TOKEN_KEY: &str = "palaver.session_token";

/// Default lifetime of a stored session token.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub struct IdentityResolver<K: KeyValueStore> {
    store: K,
    token_ttl: Duration,
}

impl<K: KeyValueStore> IdentityResolver<K> {
    pub fn new(store: K) -> Self {
        Self {
            store,
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Resolve the session token for this call.
    pub async fn resolve(&self, ctx: &SessionContext) -> ResolvedIdentity {
        let user_id = ctx.principal.as_ref().map(|p| p.id.clone());
        let is_authenticated = user_id.is_some();

        match self.store.get(SESSION_TOKEN_KEY).await {
            Ok(Some(token)) if !token.trim().is_empty() => {
                return ResolvedIdentity {
                    token,
                    is_authenticated,
                    ephemeral: false,
                    user_id,
                };
            }
            Ok(_) => {}
            Err(e) => {
                let err = ChatError::IdentityUnavailable(e.to_string());
                warn!(error = %err, "could not read stored session token");
            }
        }

        if let Some(id) = &user_id {
            return ResolvedIdentity {
                token: id.clone(),
                is_authenticated,
                ephemeral: false,
                user_id,
            };
        }

        let token = Uuid::new_v4().simple().to_string();
        let ephemeral = if ctx.consent.is_granted() {
            match self.persist(&token).await {
                Ok(()) => {
                    info!("issued new session token");
                    false
                }
                Err(err) => {
                    warn!(error = %err, "continuing with an ephemeral session token");
                    true
                }
            }
        } else {
            debug!("persistence consent withheld, session token is ephemeral");
            true
        };

        ResolvedIdentity {
            token,
            is_authenticated,
            ephemeral,
            user_id,
        }
    }

    /// Forget the stored token so the next resolution starts over.
    pub async fn forget(&self) -> Result<(), ChatError> {
        self.store
            .remove(SESSION_TOKEN_KEY)
            .await
            .map_err(|e| ChatError::IdentityUnavailable(e.to_string()))
    }

    async fn persist(&self, token: &str) -> Result<(), ChatError> {
        self.store
            .set(SESSION_TOKEN_KEY, token, Some(self.token_ttl))
            .await
            .map_err(|e| ChatError::IdentityUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryKeyValueStore;
    use palaver_types::identity::{PersistenceConsent, Principal};
    use palaver_types::usage::UserRole;

    fn anonymous(consent: bool) -> SessionContext {
        SessionContext::anonymous(PersistenceConsent::from(consent))
    }

    #[tokio::test]
    async fn test_token_is_stable_across_calls() {
        let resolver = IdentityResolver::new(InMemoryKeyValueStore::new());
        let first = resolver.resolve(&anonymous(true)).await;
        let second = resolver.resolve(&anonymous(true)).await;

        assert!(!first.ephemeral);
        assert!(!first.is_authenticated);
        assert_eq!(first.token, second.token);
        assert!(!first.token.is_empty());
    }

    #[tokio::test]
    async fn test_no_consent_is_ephemeral_and_not_stored() {
        let resolver = IdentityResolver::new(InMemoryKeyValueStore::new());
        let first = resolver.resolve(&anonymous(false)).await;
        let second = resolver.resolve(&anonymous(false)).await;

        assert!(first.ephemeral);
        assert!(!first.token.is_empty());
        assert_ne!(first.token, second.token);
        assert!(resolver.store.get(SESSION_TOKEN_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_failure_falls_back_to_ephemeral() {
        let store = InMemoryKeyValueStore::new();
        store.set_failing(true);
        let resolver = IdentityResolver::new(store);

        let resolved = resolver.resolve(&anonymous(true)).await;
        assert!(resolved.ephemeral);
        assert!(!resolved.token.is_empty());
    }

    #[tokio::test]
    async fn test_principal_id_used_when_nothing_stored() {
        let resolver = IdentityResolver::new(InMemoryKeyValueStore::new());
        let ctx = SessionContext::authenticated(
            Principal {
                id: "user-7".to_string(),
                role: UserRole::User,
            },
            PersistenceConsent::Granted,
        );

        let resolved = resolver.resolve(&ctx).await;
        assert_eq!(resolved.token, "user-7");
        assert!(resolved.is_authenticated);
        assert!(!resolved.ephemeral);
        assert_eq!(resolved.user_id.as_deref(), Some("user-7"));
    }

    #[tokio::test]
    async fn test_stored_token_wins_over_principal() {
        let resolver = IdentityResolver::new(InMemoryKeyValueStore::new());
        let anon = resolver.resolve(&anonymous(true)).await;

        let ctx = SessionContext::authenticated(
            Principal {
                id: "user-7".to_string(),
                role: UserRole::User,
            },
            PersistenceConsent::Granted,
        );
        let resolved = resolver.resolve(&ctx).await;
        assert_eq!(resolved.token, anon.token);
        assert!(resolved.is_authenticated);
    }

    #[tokio::test]
    async fn test_forget_issues_new_token() {
        let resolver = IdentityResolver::new(InMemoryKeyValueStore::new());
        let first = resolver.resolve(&anonymous(true)).await;
        resolver.forget().await.unwrap();
        let second = resolver.resolve(&anonymous(true)).await;
        assert_ne!(first.token, second.token);
    }
}
