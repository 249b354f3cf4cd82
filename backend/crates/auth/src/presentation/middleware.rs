//! Auth Middleware
//!
//! Runs the gateway in front of protected routes and exposes the result to
//! handlers through the [`AuthenticatedContext`] extractor.

use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequestParts, OriginalUri, State};
use axum::http::Request;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use platform::client::extract_client_ip;
use platform::kv::KvStore;
use std::net::SocketAddr;

use crate::application::gateway::{AuthRequest, AuthenticatedContext};
use crate::application::session::SessionGuard;
use crate::domain::repository::CredentialStore;
use crate::error::AuthError;
use crate::presentation::handlers::{AuthAppState, now_ms};

/// Middleware that requires a signed request (or a session)
///
/// The signature covers the URI as the client sent it, so nested routers are
/// evaluated against [`OriginalUri`] rather than the stripped path.
pub async fn require_auth<S, K, G>(
    State(state): State<AuthAppState<S, K, G>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError>
where
    S: CredentialStore + Send + Sync + 'static,
    K: KvStore + Send + Sync + 'static,
    G: SessionGuard + Send + Sync + 'static,
{
    let direct_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let client_ip = extract_client_ip(req.headers(), direct_ip, state.config.trust_forwarded_for);

    let uri = req
        .extensions()
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| req.uri().clone());

    let auth_request = AuthRequest {
        method: req.method().as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: req.headers().clone(),
        client_ip,
        received_at_ms: now_ms(),
    };

    let context = state.gateway.authorize(&auth_request).await?;
    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

impl<St> FromRequestParts<St> for AuthenticatedContext
where
    St: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedContext>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}
