//! Session Guard
//!
//! Seam for an externally managed session mechanism. The gateway asks it for
//! the current identity only when a request carries no signed claim.

use crate::application::gateway::AuthRequest;
use crate::domain::value_object::identity_ref::IdentityRef;

#[trait_variant::make(SessionGuard: Send)]
pub trait LocalSessionGuard {
    /// Identity bound to the request's session, if any
    async fn current_session_identity(&self, request: &AuthRequest) -> Option<IdentityRef>;
}

/// Guard for deployments without sessions; every request must be signed
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSessionGuard;

impl SessionGuard for NoSessionGuard {
    async fn current_session_identity(&self, _request: &AuthRequest) -> Option<IdentityRef> {
        None
    }
}
