//! Application Layer
//!
//! Use cases and application services.

pub mod config;
pub mod gateway;
pub mod register;
pub mod replay_guard;
pub mod reset_password;
pub mod session;
pub mod sign_in;
pub mod throttle_meter;

// Re-exports
pub use config::{AuthConfig, FailurePolicy};
pub use gateway::{AuthGateway, AuthRequest, AuthStage, AuthVia, AuthenticatedContext};
pub use register::{CredentialParams, RegisterInput, RegisterUseCase};
pub use replay_guard::ReplayGuard;
pub use reset_password::{ResetPasswordInput, ResetPasswordUseCase};
pub use session::{NoSessionGuard, SessionGuard};
pub use sign_in::{SignInInput, SignInUseCase};
pub use throttle_meter::ThrottleMeter;
