//! Register Use Case
//!
//! Creates a new identity with freshly derived credentials.

use std::sync::Arc;

use platform::password::{ClearTextPassword, Iterations, Salt};

use crate::application::config::AuthConfig;
use crate::domain::entity::identity::{Credentials, Identity};
use crate::domain::repository::CredentialStore;
use crate::domain::value_object::email::Email;
use crate::error::{AuthError, AuthResult};

/// Register input
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    /// Requested cost; must lie within the configured bounds
    pub iterations: Option<u32>,
    /// Explicit salt (imports and fixtures); generated when absent
    pub salt: Option<Salt>,
}

/// Parameters a client needs to derive its signing key
#[derive(Debug, Clone)]
pub struct CredentialParams {
    pub identity_ref: String,
    pub salt: String,
    pub iterations: u32,
}

impl CredentialParams {
    pub fn of(identity: &Identity) -> Self {
        Self {
            identity_ref: identity.identity_ref.to_string(),
            salt: identity.credentials.salt.as_str().to_string(),
            iterations: identity.credentials.iterations.get(),
        }
    }
}

/// Register use case
pub struct RegisterUseCase<S>
where
    S: CredentialStore,
{
    store: Arc<S>,
    config: Arc<AuthConfig>,
}

impl<S> RegisterUseCase<S>
where
    S: CredentialStore + Sync,
{
    pub fn new(store: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    pub async fn execute(&self, input: RegisterInput) -> AuthResult<CredentialParams> {
        let email = Email::new(&input.email)?;

        // Validate everything before touching the store
        let password = ClearTextPassword::new(input.password, self.config.min_password_length)?;
        let iterations = Iterations::new(
            input.iterations.unwrap_or(self.config.default_iterations),
            self.config.min_iterations,
            self.config.max_iterations,
        )?;
        let salt = input
            .salt
            .unwrap_or_else(|| Salt::generate(self.config.salt_bytes));

        if self.store.exists_by_email(&email).await? {
            return Err(AuthError::EmailTaken);
        }

        let credentials = Credentials::derive(&password, salt, iterations);
        let identity = Identity::new(email, credentials);

        self.store.create(&identity).await?;

        tracing::info!(
            identity_ref = %identity.identity_ref,
            iterations = iterations.get(),
            "Identity registered"
        );

        Ok(CredentialParams::of(&identity))
    }
}
