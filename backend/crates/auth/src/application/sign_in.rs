//! Sign In Use Case
//!
//! Checks a password and hands back the parameters the client needs to
//! derive its signing key. No session or token is issued; every later
//! request proves possession of the key by signing itself.

use std::sync::Arc;

use platform::password::{ClearTextPassword, Iterations, Salt, verify};

use crate::application::config::AuthConfig;
use crate::application::register::CredentialParams;
use crate::domain::repository::CredentialStore;
use crate::error::{AuthError, AuthResult};

/// Salt used for the decoy derivation when the identifier is unknown
const DECOY_SALT: &str = "decoy";

/// Sign in input
pub struct SignInInput {
    /// Email or identity ref
    pub identifier: String,
    pub password: String,
}

/// Sign in use case
pub struct SignInUseCase<S>
where
    S: CredentialStore,
{
    store: Arc<S>,
    config: Arc<AuthConfig>,
}

impl<S> SignInUseCase<S>
where
    S: CredentialStore + Sync,
{
    pub fn new(store: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    pub async fn execute(&self, input: SignInInput) -> AuthResult<CredentialParams> {
        let candidate = ClearTextPassword::candidate(input.password);
        let identifier = input.identifier.trim();

        let Some(identity) = self.store.find_by_email_or_ref(identifier).await? else {
            // Same amount of work as a real check, so response time does not
            // reveal whether the identifier exists.
            self.decoy_derivation(&candidate)?;
            return Err(AuthError::InvalidCredentials);
        };

        let credentials = &identity.credentials;
        if !verify(
            &candidate,
            &credentials.salt,
            credentials.iterations,
            &credentials.password_hash,
        ) {
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!(identity_ref = %identity.identity_ref, "Identity signed in");

        Ok(CredentialParams::of(&identity))
    }

    fn decoy_derivation(&self, candidate: &ClearTextPassword) -> AuthResult<()> {
        let salt = Salt::new(DECOY_SALT)?;
        let iterations = Iterations::new(self.config.default_iterations, 1, u32::MAX)?;
        std::hint::black_box(candidate.derive_key(&salt, iterations));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use platform::password::Salt;

    use super::*;
    use crate::application::register::{RegisterInput, RegisterUseCase};
    use crate::infra::memory::MemoryCredentialStore;

    async fn setup(iterations: u32) -> SignInUseCase<MemoryCredentialStore> {
        let store = Arc::new(MemoryCredentialStore::new());
        let config = Arc::new(AuthConfig {
            default_iterations: iterations,
            ..AuthConfig::default()
        });
        RegisterUseCase::new(store.clone(), config.clone())
            .execute(RegisterInput {
                email: "a@b.co".to_string(),
                password: "1q1q".to_string(),
                iterations: None,
                salt: Some(Salt::new("s1").unwrap()),
            })
            .await
            .unwrap();
        SignInUseCase::new(store, config)
    }

    fn input(identifier: &str, password: &str) -> SignInInput {
        SignInInput {
            identifier: identifier.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_sign_in_returns_stored_parameters() {
        let use_case = setup(10_000).await;
        let params = use_case.execute(input(" A@B.co ", "1q1q")).await.unwrap();
        assert_eq!(params.salt, "s1");
        assert_eq!(params.iterations, 10_000);
    }

    #[tokio::test]
    async fn test_unknown_identifier_costs_a_full_derivation() {
        let use_case = setup(50_000).await;

        let started = Instant::now();
        let wrong_password = use_case.execute(input("a@b.co", "nope")).await;
        let known_elapsed = started.elapsed();

        let started = Instant::now();
        let unknown = use_case.execute(input("nobody@b.co", "nope")).await;
        let unknown_elapsed = started.elapsed();

        assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
        assert!(
            unknown_elapsed * 4 >= known_elapsed,
            "unknown {unknown_elapsed:?} vs known {known_elapsed:?}"
        );
    }
}
