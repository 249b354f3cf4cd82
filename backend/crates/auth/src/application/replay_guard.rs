//! Replay Guard
//!
//! Records every accepted `who` token and refuses to accept it again.
//! Scope is global: the key is derived from the token alone.

use std::sync::Arc;
use std::time::Duration;

use platform::crypto::{sha256, to_hex};
use platform::kv::{KvStore, bounded};

use crate::domain::value_object::who_token::WhoToken;
use crate::error::{AuthError, AuthResult};

const KEY_PREFIX: &str = "replay:";

pub struct ReplayGuard<K>
where
    K: KvStore,
{
    store: Arc<K>,
    retention: Option<Duration>,
    timeout: Duration,
}

impl<K> ReplayGuard<K>
where
    K: KvStore + Sync,
{
    pub fn new(store: Arc<K>, retention: Option<Duration>, timeout: Duration) -> Self {
        Self {
            store,
            retention,
            timeout,
        }
    }

    /// Store key for a token (digest, so raw tokens never reach the store)
    pub fn key_for(token: &WhoToken) -> String {
        format!("{}{}", KEY_PREFIX, to_hex(&sha256(token.as_str().as_bytes())))
    }

    /// Consume the token
    ///
    /// `Ok(())` the first time, `ReplayedRequest` afterwards. Store failures
    /// always reject: accepting would reopen the replay window.
    pub async fn check_and_consume(&self, token: &WhoToken) -> AuthResult<()> {
        let key = Self::key_for(token);
        let inserted = bounded(self.timeout, self.store.insert_if_absent(&key, self.retention))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Replay store failure");
                AuthError::from(e)
            })?;

        if inserted {
            Ok(())
        } else {
            tracing::warn!(identity_ref = %token.identity_ref(), "Replayed who token");
            Err(AuthError::ReplayedRequest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_object::identity_ref::IdentityRef;
    use platform::kv::MemoryKvStore;

    fn guard() -> (ReplayGuard<MemoryKvStore>, Arc<MemoryKvStore>) {
        let store = Arc::new(MemoryKvStore::new());
        let guard = ReplayGuard::new(store.clone(), None, Duration::from_secs(1));
        (guard, store)
    }

    #[tokio::test]
    async fn test_consume_once() {
        let (guard, store) = guard();
        let token = WhoToken::from_parts(IdentityRef::new(), [1u8; 32]);

        assert!(guard.check_and_consume(&token).await.is_ok());
        assert!(matches!(
            guard.check_and_consume(&token).await,
            Err(AuthError::ReplayedRequest)
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_tokens_are_independent() {
        let (guard, _) = guard();
        let identity_ref = IdentityRef::new();
        let a = WhoToken::from_parts(identity_ref, [1u8; 32]);
        let b = WhoToken::from_parts(identity_ref, [2u8; 32]);

        assert!(guard.check_and_consume(&a).await.is_ok());
        assert!(guard.check_and_consume(&b).await.is_ok());
    }

    #[test]
    fn test_key_hides_token() {
        let token = WhoToken::from_parts(IdentityRef::new(), [1u8; 32]);
        let key = ReplayGuard::<MemoryKvStore>::key_for(&token);
        assert!(key.starts_with("replay:"));
        assert_eq!(key.len(), "replay:".len() + 64);
        assert!(!key.contains(token.identity_ref().as_str()));
    }
}
