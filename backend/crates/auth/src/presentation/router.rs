//! Auth Router

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use platform::kv::KvStore;
use std::sync::Arc;

use crate::application::config::AuthConfig;
use crate::application::session::SessionGuard;
use crate::domain::repository::CredentialStore;
use crate::infra::postgres::{PgCredentialStore, PgKvStore};
use crate::presentation::handlers::{self, AuthAppState};
use crate::presentation::middleware::require_auth;

/// Create the Auth router with PostgreSQL stores
pub fn auth_router(store: PgCredentialStore, kv: PgKvStore, config: AuthConfig) -> Router {
    auth_router_generic(AuthAppState::new(Arc::new(store), Arc::new(kv), config))
}

/// Create a generic Auth router for any store implementation
pub fn auth_router_generic<S, K, G>(state: AuthAppState<S, K, G>) -> Router
where
    S: CredentialStore + Send + Sync + 'static,
    K: KvStore + Send + Sync + 'static,
    G: SessionGuard + Send + Sync + 'static,
{
    let signed = Router::new()
        .route("/password", post(handlers::reset_password::<S, K, G>))
        .route("/whoami", get(handlers::whoami));

    Router::new()
        .route("/register", post(handlers::register::<S, K, G>))
        .route("/login", post(handlers::login::<S, K, G>))
        .merge(protected(signed, state.clone()))
        .with_state(state)
}

/// Put `routes` behind the request-signature gateway
pub fn protected<S, K, G>(
    routes: Router<AuthAppState<S, K, G>>,
    state: AuthAppState<S, K, G>,
) -> Router<AuthAppState<S, K, G>>
where
    S: CredentialStore + Send + Sync + 'static,
    K: KvStore + Send + Sync + 'static,
    G: SessionGuard + Send + Sync + 'static,
{
    routes.route_layer(from_fn_with_state(state, require_auth::<S, K, G>))
}
