//! Reset Password Use Case
//!
//! Replaces salt, iterations and hash together. Tokens signed with the old
//! key stop verifying immediately.

use std::sync::Arc;

use platform::password::{ClearTextPassword, Iterations, Salt};

use crate::application::config::AuthConfig;
use crate::application::register::CredentialParams;
use crate::domain::entity::identity::Credentials;
use crate::domain::repository::CredentialStore;
use crate::domain::value_object::identity_ref::IdentityRef;
use crate::error::{AuthError, AuthResult};

/// Reset password input
pub struct ResetPasswordInput {
    pub new_password: String,
    pub iterations: Option<u32>,
}

/// Reset password use case
pub struct ResetPasswordUseCase<S>
where
    S: CredentialStore,
{
    store: Arc<S>,
    config: Arc<AuthConfig>,
}

impl<S> ResetPasswordUseCase<S>
where
    S: CredentialStore + Sync,
{
    pub fn new(store: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    pub async fn execute(
        &self,
        identity_ref: &IdentityRef,
        input: ResetPasswordInput,
    ) -> AuthResult<CredentialParams> {
        let password =
            ClearTextPassword::new(input.new_password, self.config.min_password_length)?;
        let iterations = Iterations::new(
            input.iterations.unwrap_or(self.config.default_iterations),
            self.config.min_iterations,
            self.config.max_iterations,
        )?;

        let mut identity = self
            .store
            .find_by_ref(identity_ref)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let credentials =
            Credentials::derive(&password, Salt::generate(self.config.salt_bytes), iterations);
        self.store
            .update_credentials(&identity.id, &credentials)
            .await?;
        identity.replace_credentials(credentials);

        tracing::info!(identity_ref = %identity.identity_ref, "Credentials reset");

        Ok(CredentialParams::of(&identity))
    }
}
