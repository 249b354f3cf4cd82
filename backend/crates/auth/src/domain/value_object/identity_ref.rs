//! IdentityRef Value Object
//!
//! Public, stable identifier of an identity. It is what clients put in front
//! of every `who` token, so it must stay URL-safe and must never contain the
//! token separator (`.`).
//!
//! ## Usage
//! ```rust
//! use auth::domain::value_object::identity_ref::IdentityRef;
//!
//! let identity_ref = IdentityRef::new();
//! assert_eq!(identity_ref.as_str().len(), 21);
//! assert!(!identity_ref.as_str().contains('.'));
//! ```
use std::str::FromStr;

use kernel::error::app_error::{AppError, AppResult};
use nid::Nanoid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityRef(Nanoid);

impl IdentityRef {
    #[inline]
    pub fn new() -> Self {
        Self(Nanoid::new())
    }

    #[inline]
    pub fn parse_str(s: &str) -> AppResult<Self> {
        Nanoid::from_str(s)
            .map(IdentityRef)
            .map_err(|e| AppError::bad_request(format!("Invalid identity ref: {}", e)))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for IdentityRef {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        IdentityRef::parse_str(s)
    }
}

impl Default for IdentityRef {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IdentityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ref_is_url_safe() {
        for _ in 0..64 {
            let identity_ref = IdentityRef::new();
            assert!(
                identity_ref
                    .as_str()
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            );
        }
    }

    #[test]
    fn test_identity_ref_parse() {
        let raw = "0123456789abcdefghi01";
        let identity_ref: IdentityRef = raw.parse().unwrap();
        assert_eq!(identity_ref.as_str(), raw);
        assert_eq!(identity_ref.to_string(), raw);
    }

    #[test]
    fn test_identity_ref_parse_invalid() {
        assert!(IdentityRef::parse_str("with.dot.inside.abcdef").is_err());
        assert!(IdentityRef::parse_str("short").is_err());
        assert!(IdentityRef::parse_str("").is_err());
    }
}
