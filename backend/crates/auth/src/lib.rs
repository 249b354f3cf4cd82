//! Auth (Authentication) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, signing rules, repository traits
//! - `application/` - Use cases and the request gateway
//! - `infra/` - PostgreSQL and in-memory store implementations
//! - `presentation/` - HTTP handlers, DTOs, router, middleware
//!
//! ## Features
//! - Registration and sign-in with email + password
//! - Per-request signatures (`who=<identity_ref>.<tag>` query parameter)
//! - Replay protection (every signed request is accepted once)
//! - Fixed-window throttling per identity or client address
//!
//! ## Security Model
//! - The server stores only the PBKDF2-HMAC-SHA256 derived key, never the password
//! - Clients derive the same key locally and sign `METHOD\ncanonical_target`
//! - Store failures reject requests unless the throttle is configured to fail open
//! - Developer refs skip signature verification but are still replay-checked

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;


// Re-exports for convenience
pub use application::config::{AuthConfig, FailurePolicy};
pub use application::gateway::{AuthGateway, AuthRequest, AuthVia, AuthenticatedContext};
pub use domain::service::signature::SigningContext;
pub use error::{AuthError, AuthResult};
pub use infra::postgres::{PgCredentialStore, PgKvStore};
pub use presentation::router::{auth_router, auth_router_generic, protected};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

// Convenience re-exports
pub mod config {
    pub use crate::application::config::*;
}

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
    pub use crate::presentation::dto::*;
}

pub mod store {
    pub use crate::infra::memory::MemoryCredentialStore;
    pub use crate::infra::postgres::{PgCredentialStore, PgKvStore};
}

pub mod middleware {
    pub use crate::presentation::middleware::*;
}
