//! API DTOs (Data Transfer Objects)

use serde::{Deserialize, Serialize};

use crate::application::gateway::AuthVia;
use crate::application::register::CredentialParams;

// ============================================================================
// Register
// ============================================================================

/// Register request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    /// PBKDF2 cost; server default when omitted
    pub iterations: Option<u32>,
}

// ============================================================================
// Login
// ============================================================================

/// Login request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Email or identity ref
    pub identifier: String,
    pub password: String,
}

// ============================================================================
// Password Reset
// ============================================================================

/// Password reset request (signed)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: String,
    pub iterations: Option<u32>,
}

// ============================================================================
// Responses
// ============================================================================

/// Key derivation parameters returned by register, login and reset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialParamsResponse {
    pub identity_ref: String,
    pub salt: String,
    pub iterations: u32,
}

impl From<CredentialParams> for CredentialParamsResponse {
    fn from(params: CredentialParams) -> Self {
        Self {
            identity_ref: params.identity_ref,
            salt: params.salt,
            iterations: params.iterations,
        }
    }
}

/// Current identity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIResponse {
    pub identity_ref: String,
    pub is_developer_bypass: bool,
    pub via: AuthVia,
}
