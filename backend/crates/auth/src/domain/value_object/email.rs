//! Email Value Object
//!
//! Login identifier of an identity. Stored lowercased so that lookups and the
//! uniqueness constraint are case-insensitive.

use kernel::error::app_error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Maximum email length (per RFC 5321)
const EMAIL_MAX_LENGTH: usize = 254;

/// Maximum local part length (per RFC 5321)
const LOCAL_PART_MAX_LENGTH: usize = 64;

/// Email address value object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
    /// Create a new email with validation
    pub fn new(email: impl AsRef<str>) -> AppResult<Self> {
        let email = email.as_ref().trim().to_lowercase();

        if email.is_empty() {
            return Err(AppError::bad_request("Email cannot be empty"));
        }

        if email.len() > EMAIL_MAX_LENGTH {
            return Err(AppError::bad_request(format!(
                "Email must be at most {} characters",
                EMAIL_MAX_LENGTH
            )));
        }

        if !is_valid_format(&email) {
            return Err(AppError::bad_request("Invalid email format"));
        }

        Ok(Self(email))
    }

    /// Whether a login identifier should be treated as an email
    pub fn looks_like(identifier: &str) -> bool {
        identifier.contains('@')
    }

    /// Create from database value (assumed already validated)
    pub fn from_db(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_format(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || local.len() > LOCAL_PART_MAX_LENGTH || domain.contains('@') {
        return false;
    }

    if local.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }

    domain.contains('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && !domain.starts_with(['.', '-'])
        && !domain.ends_with(['.', '-'])
        && !domain.contains("..")
}

impl FromStr for Email {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        Email::new(s)
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_valid() {
        assert!(Email::new("taster@example.com").is_ok());
        assert!(Email::new("first.last@cellar.co.jp").is_ok());
        assert!(Email::new("taster+contest@example.com").is_ok());
    }

    #[test]
    fn test_email_invalid() {
        assert!(Email::new("").is_err());
        assert!(Email::new("   ").is_err());
        assert!(Email::new("tasterexample.com").is_err());
        assert!(Email::new("taster@").is_err());
        assert!(Email::new("@example.com").is_err());
        assert!(Email::new("taster@@example.com").is_err());
        assert!(Email::new("taster@example").is_err());
        assert!(Email::new("taster@example..com").is_err());
        assert!(Email::new("tas ter@example.com").is_err());
    }

    #[test]
    fn test_email_is_lowercased_and_trimmed() {
        let email = Email::new("  Taster@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "taster@example.com");
    }

    #[test]
    fn test_looks_like() {
        assert!(Email::looks_like("taster@example.com"));
        assert!(!Email::looks_like("0123456789abcdefghi01"));
    }
}
