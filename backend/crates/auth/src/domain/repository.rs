//! Repository Traits
//!
//! Interfaces for data persistence. Implementation is in infrastructure layer.

use kernel::id::IdentityId;

use crate::domain::entity::identity::{Credentials, Identity};
use crate::domain::value_object::{email::Email, identity_ref::IdentityRef};
use crate::error::AuthResult;

/// Credential store trait
#[trait_variant::make(CredentialStore: Send)]
pub trait LocalCredentialStore {
    /// Create a new identity
    ///
    /// Fails with `AuthError::EmailTaken` when the email is already registered.
    async fn create(&self, identity: &Identity) -> AuthResult<()>;

    /// Find identity by public ref
    async fn find_by_ref(&self, identity_ref: &IdentityRef) -> AuthResult<Option<Identity>>;

    /// Find identity by email (case-insensitive) or public ref
    async fn find_by_email_or_ref(&self, identifier: &str) -> AuthResult<Option<Identity>>;

    /// Check if email exists
    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool>;

    /// Replace salt, iterations and hash
    async fn update_credentials(&self, id: &IdentityId, credentials: &Credentials)
    -> AuthResult<()>;
}
