//! HTTP Handlers

use axum::Json;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use platform::client::extract_client_ip;
use platform::kv::KvStore;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::application::config::AuthConfig;
use crate::application::gateway::{AuthGateway, AuthenticatedContext};
use crate::application::session::{NoSessionGuard, SessionGuard};
use crate::application::{
    RegisterInput, RegisterUseCase, ResetPasswordInput, ResetPasswordUseCase, SignInInput,
    SignInUseCase,
};
use crate::domain::repository::CredentialStore;
use crate::error::AuthResult;
use crate::presentation::dto::{
    CredentialParamsResponse, LoginRequest, RegisterRequest, ResetPasswordRequest,
    WhoAmIResponse,
};

/// Shared state for auth handlers and middleware
pub struct AuthAppState<S, K, G = NoSessionGuard>
where
    S: CredentialStore,
    K: KvStore,
    G: SessionGuard,
{
    pub store: Arc<S>,
    pub gateway: Arc<AuthGateway<S, K, G>>,
    pub config: Arc<AuthConfig>,
}

impl<S, K, G> Clone for AuthAppState<S, K, G>
where
    S: CredentialStore,
    K: KvStore,
    G: SessionGuard,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            gateway: self.gateway.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, K> AuthAppState<S, K, NoSessionGuard>
where
    S: CredentialStore + Sync,
    K: KvStore + Sync,
{
    pub fn new(store: Arc<S>, kv: Arc<K>, config: AuthConfig) -> Self {
        Self::with_session_guard(store, kv, NoSessionGuard, config)
    }
}

impl<S, K, G> AuthAppState<S, K, G>
where
    S: CredentialStore + Sync,
    K: KvStore + Sync,
    G: SessionGuard + Sync,
{
    pub fn with_session_guard(store: Arc<S>, kv: Arc<K>, session_guard: G, config: AuthConfig) -> Self {
        let config = Arc::new(config);
        let gateway = AuthGateway::with_session_guard(store.clone(), kv, session_guard, config.clone());
        Self {
            store,
            gateway: Arc::new(gateway),
            config,
        }
    }
}

/// Client address, honouring X-Forwarded-For only when configured
pub struct ClientIp(pub Option<IpAddr>);

impl<S, K, G> FromRequestParts<AuthAppState<S, K, G>> for ClientIp
where
    S: CredentialStore + Send + Sync + 'static,
    K: KvStore + Send + Sync + 'static,
    G: SessionGuard + Send + Sync + 'static,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthAppState<S, K, G>,
    ) -> Result<Self, Self::Rejection> {
        let direct_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        Ok(ClientIp(extract_client_ip(
            &parts.headers,
            direct_ip,
            state.config.trust_forwarded_for,
        )))
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Register
// ============================================================================

/// POST /api/auth/register
pub async fn register<S, K, G>(
    State(state): State<AuthAppState<S, K, G>>,
    ClientIp(client_ip): ClientIp,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<(StatusCode, Json<CredentialParamsResponse>)>
where
    S: CredentialStore + Send + Sync + 'static,
    K: KvStore + Send + Sync + 'static,
    G: SessionGuard + Send + Sync + 'static,
{
    state.gateway.throttle_anonymous(client_ip, now_ms()).await?;

    let use_case = RegisterUseCase::new(state.store.clone(), state.config.clone());

    let input = RegisterInput {
        email: req.email,
        password: req.password,
        iterations: req.iterations,
        salt: None,
    };

    let output = use_case.execute(input).await?;

    Ok((StatusCode::CREATED, Json(output.into())))
}

// ============================================================================
// Login
// ============================================================================

/// POST /api/auth/login
pub async fn login<S, K, G>(
    State(state): State<AuthAppState<S, K, G>>,
    ClientIp(client_ip): ClientIp,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<CredentialParamsResponse>>
where
    S: CredentialStore + Send + Sync + 'static,
    K: KvStore + Send + Sync + 'static,
    G: SessionGuard + Send + Sync + 'static,
{
    state.gateway.throttle_anonymous(client_ip, now_ms()).await?;

    let use_case = SignInUseCase::new(state.store.clone(), state.config.clone());

    let input = SignInInput {
        identifier: req.identifier,
        password: req.password,
    };

    let output = use_case.execute(input).await?;

    Ok(Json(output.into()))
}

// ============================================================================
// Password Reset (signed)
// ============================================================================

/// POST /api/auth/password
pub async fn reset_password<S, K, G>(
    State(state): State<AuthAppState<S, K, G>>,
    context: AuthenticatedContext,
    Json(req): Json<ResetPasswordRequest>,
) -> AuthResult<Json<CredentialParamsResponse>>
where
    S: CredentialStore + Send + Sync + 'static,
    K: KvStore + Send + Sync + 'static,
    G: SessionGuard + Send + Sync + 'static,
{
    let use_case = ResetPasswordUseCase::new(state.store.clone(), state.config.clone());

    let input = ResetPasswordInput {
        new_password: req.new_password,
        iterations: req.iterations,
    };

    let output = use_case.execute(&context.identity_ref, input).await?;

    Ok(Json(output.into()))
}

// ============================================================================
// Who Am I
// ============================================================================

/// GET /api/auth/whoami
pub async fn whoami(context: AuthenticatedContext) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        identity_ref: context.identity_ref.to_string(),
        is_developer_bypass: context.is_developer_bypass,
        via: context.via,
    })
}
