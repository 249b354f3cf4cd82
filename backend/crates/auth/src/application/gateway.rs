//! Auth Gateway
//!
//! Drives one request through the authentication states:
//!
//! ```text
//! Unauthenticated -> IdentityResolved -> SignatureVerified -> ReplayChecked
//!                 -> ThrottleChecked -> Authorized
//! ```
//!
//! Any step may end in a rejection instead. Each step performs only its own
//! side effect, so a request rejected at the signature step never consumes
//! its token and a replayed request never counts against the throttle.
//! Session-only requests go from `IdentityResolved` straight to `Authorized`.

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use derive_more::Display;
use platform::client::ClientFingerprint;
use platform::kv::KvStore;
use platform::password::DerivedKey;
use platform::rate_limit::RateLimitResult;
use serde::Serialize;

use crate::application::config::AuthConfig;
use crate::application::replay_guard::ReplayGuard;
use crate::application::session::{NoSessionGuard, SessionGuard};
use crate::application::throttle_meter::ThrottleMeter;
use crate::domain::entity::identity::Identity;
use crate::domain::repository::CredentialStore;
use crate::domain::service::signature::{self, split_path_and_query, split_target};
use crate::domain::value_object::{identity_ref::IdentityRef, who_token::WhoToken};
use crate::error::{AuthError, AuthResult};

/// Gateway state names (used in logs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AuthStage {
    #[display("unauthenticated")]
    Unauthenticated,
    #[display("identity_resolved")]
    IdentityResolved,
    #[display("signature_verified")]
    SignatureVerified,
    #[display("replay_checked")]
    ReplayChecked,
    #[display("throttle_checked")]
    ThrottleChecked,
    #[display("authorized")]
    Authorized,
}

/// How the identity was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthVia {
    Signature,
    DeveloperBypass,
    Session,
}

/// Transport-independent view of an incoming request
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub client_ip: Option<IpAddr>,
    /// Arrival time (epoch milliseconds); drives the throttle window
    pub received_at_ms: i64,
}

impl AuthRequest {
    /// `target` is `path` or `path?query`
    pub fn new(method: impl Into<String>, target: &str, received_at_ms: i64) -> Self {
        let (path, query) = split_path_and_query(target);
        Self {
            method: method.into(),
            path: path.to_string(),
            query: query.map(str::to_string),
            headers: HeaderMap::new(),
            client_ip: None,
            received_at_ms,
        }
    }

    pub fn with_client_ip(mut self, client_ip: Option<IpAddr>) -> Self {
        self.client_ip = client_ip;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Result of a successful evaluation, attached to the request
#[derive(Debug, Clone)]
pub struct AuthenticatedContext {
    pub identity_ref: IdentityRef,
    pub is_developer_bypass: bool,
    pub via: AuthVia,
    /// `None` when the request was exempt from throttling
    pub rate_limit: Option<RateLimitResult>,
}

enum Claim {
    Signed {
        token: WhoToken,
        canonical_target: String,
        /// `None` for developer allow-listed refs
        key: Option<DerivedKey>,
    },
    Session(IdentityRef),
}

struct Verified {
    token: WhoToken,
    via: AuthVia,
}

enum GatewayState {
    Unauthenticated,
    IdentityResolved(Claim),
    SignatureVerified(Verified),
    ReplayChecked(Verified),
    ThrottleChecked(Verified, Option<RateLimitResult>),
    Authorized(AuthenticatedContext),
}

impl GatewayState {
    fn stage(&self) -> AuthStage {
        match self {
            GatewayState::Unauthenticated => AuthStage::Unauthenticated,
            GatewayState::IdentityResolved(_) => AuthStage::IdentityResolved,
            GatewayState::SignatureVerified(_) => AuthStage::SignatureVerified,
            GatewayState::ReplayChecked(_) => AuthStage::ReplayChecked,
            GatewayState::ThrottleChecked(..) => AuthStage::ThrottleChecked,
            GatewayState::Authorized(_) => AuthStage::Authorized,
        }
    }
}

/// Request authentication pipeline
pub struct AuthGateway<S, K, G = NoSessionGuard>
where
    S: CredentialStore,
    K: KvStore,
    G: SessionGuard,
{
    store: Arc<S>,
    replay_guard: ReplayGuard<K>,
    throttle: ThrottleMeter<K>,
    session_guard: G,
    config: Arc<AuthConfig>,
}

impl<S, K> AuthGateway<S, K, NoSessionGuard>
where
    S: CredentialStore + Sync,
    K: KvStore + Sync,
{
    pub fn new(store: Arc<S>, kv: Arc<K>, config: Arc<AuthConfig>) -> Self {
        Self::with_session_guard(store, kv, NoSessionGuard, config)
    }
}

impl<S, K, G> AuthGateway<S, K, G>
where
    S: CredentialStore + Sync,
    K: KvStore + Sync,
    G: SessionGuard + Sync,
{
    pub fn with_session_guard(
        store: Arc<S>,
        kv: Arc<K>,
        session_guard: G,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            store,
            replay_guard: ReplayGuard::new(
                kv.clone(),
                config.replay_retention,
                config.store_timeout,
            ),
            throttle: ThrottleMeter::new(kv, config.clone()),
            session_guard,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn throttle(&self) -> &ThrottleMeter<K> {
        &self.throttle
    }

    /// Evaluate a request; the first failing step decides the rejection
    pub async fn authorize(&self, request: &AuthRequest) -> AuthResult<AuthenticatedContext> {
        let mut state = GatewayState::Unauthenticated;
        loop {
            let from = state.stage();
            match self.step(state, request).await {
                Ok(GatewayState::Authorized(context)) => {
                    tracing::debug!(
                        from = %from,
                        identity_ref = %context.identity_ref,
                        via = ?context.via,
                        "Request authorized"
                    );
                    return Ok(context);
                }
                Ok(next) => {
                    tracing::debug!(from = %from, to = %next.stage(), "Auth transition");
                    state = next;
                }
                Err(e) => {
                    tracing::warn!(
                        stage = %from,
                        error_code = e.error_code(),
                        method = %request.method,
                        path = %request.path,
                        "Request rejected"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn step(&self, state: GatewayState, request: &AuthRequest) -> AuthResult<GatewayState> {
        match state {
            GatewayState::Unauthenticated => self.resolve_identity(request).await,

            GatewayState::IdentityResolved(Claim::Session(identity_ref)) => {
                Ok(GatewayState::Authorized(AuthenticatedContext {
                    identity_ref,
                    is_developer_bypass: false,
                    via: AuthVia::Session,
                    rate_limit: None,
                }))
            }

            GatewayState::IdentityResolved(Claim::Signed {
                token,
                canonical_target,
                key,
            }) => {
                let via = match key {
                    None => AuthVia::DeveloperBypass,
                    Some(key) => {
                        signature::verify(&token, &request.method, &canonical_target, Some(&key))
                            .map_err(|_| AuthError::InvalidSignature)?;
                        AuthVia::Signature
                    }
                };
                Ok(GatewayState::SignatureVerified(Verified { token, via }))
            }

            GatewayState::SignatureVerified(verified) => {
                self.replay_guard.check_and_consume(&verified.token).await?;
                Ok(GatewayState::ReplayChecked(verified))
            }

            GatewayState::ReplayChecked(verified) => {
                let identity_ref = *verified.token.identity_ref();
                let rate_limit = if self
                    .throttle
                    .is_exempt(Some(identity_ref.as_str()), request.client_ip)
                {
                    tracing::debug!(identity_ref = %identity_ref, "Throttle exempt");
                    None
                } else {
                    let fingerprint = ClientFingerprint::Identity(identity_ref.to_string());
                    Some(
                        self.throttle
                            .check_and_increment(&fingerprint, request.received_at_ms)
                            .await?,
                    )
                };
                Ok(GatewayState::ThrottleChecked(verified, rate_limit))
            }

            GatewayState::ThrottleChecked(verified, rate_limit) => {
                Ok(GatewayState::Authorized(AuthenticatedContext {
                    identity_ref: *verified.token.identity_ref(),
                    is_developer_bypass: verified.via == AuthVia::DeveloperBypass,
                    via: verified.via,
                    rate_limit,
                }))
            }

            GatewayState::Authorized(context) => Ok(GatewayState::Authorized(context)),
        }
    }

    async fn resolve_identity(&self, request: &AuthRequest) -> AuthResult<GatewayState> {
        let target = split_target(&request.path, request.query.as_deref())
            .map_err(|_| AuthError::InvalidSignature)?;

        let Some(raw) = target.who else {
            return match self.session_guard.current_session_identity(request).await {
                Some(identity_ref) => Ok(GatewayState::IdentityResolved(Claim::Session(
                    identity_ref,
                ))),
                None => Err(AuthError::Unauthenticated),
            };
        };

        let token = WhoToken::parse(&raw).map_err(|_| AuthError::InvalidSignature)?;

        let key = if self.config.is_developer(token.identity_ref().as_str()) {
            tracing::info!(identity_ref = %token.identity_ref(), "Developer signature bypass");
            None
        } else {
            let identity = self.lookup(token.identity_ref()).await?;
            Some(
                identity
                    .ok_or(AuthError::InvalidSignature)?
                    .credentials
                    .password_hash,
            )
        };

        Ok(GatewayState::IdentityResolved(Claim::Signed {
            token,
            canonical_target: target.canonical,
            key,
        }))
    }

    async fn lookup(&self, identity_ref: &IdentityRef) -> AuthResult<Option<Identity>> {
        let found = tokio::time::timeout(
            self.config.store_timeout,
            self.store.find_by_ref(identity_ref),
        )
        .await
        .map_err(|_| AuthError::BackendUnavailable("credential lookup timed out".to_string()))?;

        found.map_err(|e| match e {
            AuthError::Database(db) => AuthError::BackendUnavailable(db.to_string()),
            other => other,
        })
    }

    /// Throttle an unauthenticated endpoint (login, register) by client address
    pub async fn throttle_anonymous(
        &self,
        client_ip: Option<IpAddr>,
        now_ms: i64,
    ) -> AuthResult<Option<RateLimitResult>> {
        if self.throttle.is_exempt(None, client_ip) {
            return Ok(None);
        }
        let fingerprint = client_ip
            .map(ClientFingerprint::Ip)
            .unwrap_or(ClientFingerprint::Unknown);
        self.throttle
            .check_and_increment(&fingerprint, now_ms)
            .await
            .map(Some)
    }
}
