//! Auth Error Types
//!
//! This module provides auth-specific error variants that integrate
//! with the unified `kernel::error::AppError` system.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use platform::kv::StoreError;
use platform::password::{PasswordHashError, PasswordPolicyError};
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    /// No signed claim and no session
    #[error("Authentication required")]
    Unauthenticated,

    /// Signature did not verify (also covers malformed tokens and unknown identities)
    #[error("Request signature is invalid")]
    InvalidSignature,

    /// `who` token already consumed
    #[error("Request already used")]
    ReplayedRequest,

    /// Throttle window exhausted
    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Replay/throttle/credential store could not answer
    #[error("Authentication backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Wrong password or unknown identifier at login
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Email already registered
    #[error("Email is already registered")]
    EmailTaken,

    /// Input validation error
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Unauthenticated
            | AuthError::InvalidSignature
            | AuthError::InvalidCredentials => ErrorKind::Unauthorized,
            AuthError::ReplayedRequest => ErrorKind::PreconditionFailed,
            AuthError::RateLimited { .. } => ErrorKind::TooManyRequests,
            AuthError::BackendUnavailable(_) => ErrorKind::ServiceUnavailable,
            AuthError::EmailTaken => ErrorKind::Conflict,
            AuthError::Validation(_) => ErrorKind::BadRequest,
            AuthError::Database(_) | AuthError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Stable machine-readable code (`errorCode` in the response body)
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::ReplayedRequest => "request_already_used",
            AuthError::RateLimited { .. } => "rate_limited",
            AuthError::BackendUnavailable(_) => "auth_backend_unavailable",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::EmailTaken => "email_taken",
            AuthError::Validation(_) => "validation_failed",
            AuthError::Database(_) | AuthError::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show to clients
    fn public_message(&self) -> String {
        match self {
            AuthError::BackendUnavailable(_) => {
                "Authentication backend unavailable, try again later".to_string()
            }
            AuthError::Database(_) | AuthError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Convert to AppError
    pub fn to_app_error(&self) -> AppError {
        AppError::new(self.kind(), self.public_message()).with_code(self.error_code())
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::BackendUnavailable(reason) => {
                tracing::error!(reason = %reason, "Auth backend unavailable");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!("Invalid login attempt");
            }
            AuthError::InvalidSignature | AuthError::ReplayedRequest => {
                tracing::warn!(error_code = self.error_code(), "Signed request rejected");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        let mut response = self.to_app_error().into_response();
        if let AuthError::RateLimited { retry_after_secs } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        match err.kind() {
            ErrorKind::BadRequest | ErrorKind::UnprocessableEntity => {
                AuthError::Validation(err.message().to_string())
            }
            _ => AuthError::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::BackendUnavailable(err.to_string())
    }
}

impl From<PasswordPolicyError> for AuthError {
    fn from(err: PasswordPolicyError) -> Self {
        AuthError::Validation(err.to_string())
    }
}

impl From<PasswordHashError> for AuthError {
    fn from(err: PasswordHashError) -> Self {
        AuthError::Internal(err.to_string())
    }
}
