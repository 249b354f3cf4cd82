//! In-Memory Repository Implementations
//!
//! Used by tests and embedders without a database. Not shared between
//! processes.

use std::collections::HashMap;

use kernel::id::IdentityId;
use tokio::sync::RwLock;

use crate::domain::entity::identity::{Credentials, Identity};
use crate::domain::repository::CredentialStore;
use crate::domain::value_object::{email::Email, identity_ref::IdentityRef};
use crate::error::{AuthError, AuthResult};

/// In-memory credential store keyed by identity ref
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    identities: RwLock<HashMap<IdentityRef, Identity>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }
}

impl CredentialStore for MemoryCredentialStore {
    async fn create(&self, identity: &Identity) -> AuthResult<()> {
        let mut identities = self.identities.write().await;
        if identities.values().any(|i| i.email == identity.email) {
            return Err(AuthError::EmailTaken);
        }
        if identities.contains_key(&identity.identity_ref) {
            return Err(AuthError::Internal("identity ref collision".to_string()));
        }
        identities.insert(identity.identity_ref, identity.clone());
        Ok(())
    }

    async fn find_by_ref(&self, identity_ref: &IdentityRef) -> AuthResult<Option<Identity>> {
        Ok(self.identities.read().await.get(identity_ref).cloned())
    }

    async fn find_by_email_or_ref(&self, identifier: &str) -> AuthResult<Option<Identity>> {
        let identities = self.identities.read().await;

        if Email::looks_like(identifier) {
            let Ok(email) = Email::new(identifier) else {
                return Ok(None);
            };
            return Ok(identities.values().find(|i| i.email == email).cloned());
        }

        Ok(IdentityRef::parse_str(identifier)
            .ok()
            .and_then(|identity_ref| identities.get(&identity_ref).cloned()))
    }

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool> {
        Ok(self
            .identities
            .read()
            .await
            .values()
            .any(|i| &i.email == email))
    }

    async fn update_credentials(
        &self,
        id: &IdentityId,
        credentials: &Credentials,
    ) -> AuthResult<()> {
        let mut identities = self.identities.write().await;
        let identity = identities
            .values_mut()
            .find(|i| &i.id == id)
            .ok_or_else(|| AuthError::Internal(format!("identity {id} vanished during reset")))?;
        identity.replace_credentials(credentials.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::password::{ClearTextPassword, Iterations, Salt};

    fn identity(email: &str) -> Identity {
        Identity::new(
            Email::new(email).unwrap(),
            Credentials::derive(
                &ClearTextPassword::new("1q1q".to_string(), 4).unwrap(),
                Salt::new("s1").unwrap(),
                Iterations::new(1_000, 1, u32::MAX).unwrap(),
            ),
        )
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryCredentialStore::new();
        let created = identity("taster@example.com");
        store.create(&created).await.unwrap();

        let by_ref = store.find_by_ref(&created.identity_ref).await.unwrap();
        assert_eq!(by_ref.unwrap().id, created.id);

        let by_email = store
            .find_by_email_or_ref("Taster@Example.com")
            .await
            .unwrap();
        assert_eq!(by_email.unwrap().id, created.id);

        let by_ref_str = store
            .find_by_email_or_ref(created.identity_ref.as_str())
            .await
            .unwrap();
        assert_eq!(by_ref_str.unwrap().id, created.id);

        assert!(store.find_by_email_or_ref("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let store = MemoryCredentialStore::new();
        store.create(&identity("taster@example.com")).await.unwrap();
        assert!(matches!(
            store.create(&identity("taster@example.com")).await,
            Err(AuthError::EmailTaken)
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_credentials() {
        let store = MemoryCredentialStore::new();
        let created = identity("taster@example.com");
        store.create(&created).await.unwrap();

        let replacement = Credentials::derive(
            &ClearTextPassword::new("2w2w".to_string(), 4).unwrap(),
            Salt::new("s2").unwrap(),
            Iterations::new(2_000, 1, u32::MAX).unwrap(),
        );
        store
            .update_credentials(&created.id, &replacement)
            .await
            .unwrap();

        let stored = store
            .find_by_ref(&created.identity_ref)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.credentials.salt.as_str(), "s2");
        assert_eq!(stored.credentials.iterations.get(), 2_000);
        assert!(stored.signing_key().matches(&replacement.password_hash));
    }
}
