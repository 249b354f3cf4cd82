//! Identity Entity
//!
//! An identity and the credential material its signing key is derived from.

use chrono::{DateTime, Utc};
use kernel::id::IdentityId;
use platform::password::{ClearTextPassword, DerivedKey, Iterations, Salt};

use crate::domain::value_object::{email::Email, identity_ref::IdentityRef};

/// Salt, cost and the resulting derived key
///
/// The three values only ever change together (registration, reset).
#[derive(Debug, Clone)]
pub struct Credentials {
    pub salt: Salt,
    pub iterations: Iterations,
    /// Stored hash; also the HMAC key for request signatures
    pub password_hash: DerivedKey,
}

impl Credentials {
    pub fn derive(password: &ClearTextPassword, salt: Salt, iterations: Iterations) -> Self {
        let password_hash = password.derive_key(&salt, iterations);
        Self {
            salt,
            iterations,
            password_hash,
        }
    }
}

/// Identity entity
#[derive(Debug, Clone)]
pub struct Identity {
    /// Internal UUID identifier
    pub id: IdentityId,
    /// Public-facing nanoid identifier (URL-safe)
    pub identity_ref: IdentityRef,
    pub email: Email,
    pub credentials: Credentials,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new identity
    pub fn new(email: Email, credentials: Credentials) -> Self {
        let now = Utc::now();
        Self {
            id: IdentityId::new(),
            identity_ref: IdentityRef::new(),
            email,
            credentials,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace salt, iterations and hash in one step
    pub fn replace_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
        self.updated_at = Utc::now();
    }

    /// Key used to verify this identity's request signatures
    pub fn signing_key(&self) -> &DerivedKey {
        &self.credentials.password_hash
    }
}
