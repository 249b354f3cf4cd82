//! Presentation Layer
//!
//! HTTP handlers, DTOs, router, and middleware.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use handlers::{AuthAppState, ClientIp};
pub use middleware::require_auth;
pub use router::{auth_router, auth_router_generic, protected};
