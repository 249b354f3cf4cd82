//! WhoToken Value Object
//!
//! Wire form: `<identity_ref>.<base64url(HMAC-SHA256 tag)>` carried in the
//! `who` query parameter. The token is deterministic in
//! (derived key, method, canonical target), so the same URL signed twice
//! yields the same token and the replay guard can key on it directly.

use std::fmt;

use platform::crypto::{from_base64_url, to_base64_url};
use thiserror::Error;

use crate::domain::value_object::identity_ref::IdentityRef;

/// HMAC-SHA256 tag length
pub const TAG_LEN: usize = 32;

/// Separator between the identity ref and the tag
pub const SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WhoTokenError {
    #[error("token has no separator")]
    MissingSeparator,
    #[error("token identity ref is invalid")]
    InvalidIdentityRef,
    #[error("token tag is not valid base64url")]
    InvalidEncoding,
    #[error("token tag must be {TAG_LEN} bytes")]
    InvalidTagLength,
}

#[derive(Clone, PartialEq, Eq)]
pub struct WhoToken {
    raw: String,
    identity_ref: IdentityRef,
    tag: [u8; TAG_LEN],
}

impl WhoToken {
    /// Assemble a token from its parts
    pub fn from_parts(identity_ref: IdentityRef, tag: [u8; TAG_LEN]) -> Self {
        let raw = format!("{}{}{}", identity_ref, SEPARATOR, to_base64_url(&tag));
        Self {
            raw,
            identity_ref,
            tag,
        }
    }

    /// Parse the raw query value
    pub fn parse(raw: &str) -> Result<Self, WhoTokenError> {
        let (identity_part, tag_part) = raw
            .split_once(SEPARATOR)
            .ok_or(WhoTokenError::MissingSeparator)?;

        let identity_ref = IdentityRef::parse_str(identity_part)
            .map_err(|_| WhoTokenError::InvalidIdentityRef)?;

        let tag = from_base64_url(tag_part).map_err(|_| WhoTokenError::InvalidEncoding)?;
        let tag: [u8; TAG_LEN] = tag
            .try_into()
            .map_err(|_| WhoTokenError::InvalidTagLength)?;

        Ok(Self {
            raw: raw.to_string(),
            identity_ref,
            tag,
        })
    }

    pub fn identity_ref(&self) -> &IdentityRef {
        &self.identity_ref
    }

    pub fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for WhoToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// The tag is a bearer credential for exactly one request; keep it out of logs.
impl fmt::Debug for WhoToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhoToken")
            .field("identity_ref", &self.identity_ref)
            .field("tag", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let identity_ref = IdentityRef::new();
        let token = WhoToken::from_parts(identity_ref, [3u8; TAG_LEN]);
        let parsed = WhoToken::parse(token.as_str()).unwrap();
        assert_eq!(parsed, token);
        assert_eq!(parsed.identity_ref(), &identity_ref);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let identity_ref = IdentityRef::new();
        let short_tag = to_base64_url(&[1u8; 16]);

        assert_eq!(
            WhoToken::parse("no-separator-here"),
            Err(WhoTokenError::MissingSeparator)
        );
        assert_eq!(
            WhoToken::parse(&format!("bad!.{}", to_base64_url(&[0u8; TAG_LEN]))),
            Err(WhoTokenError::InvalidIdentityRef)
        );
        assert_eq!(
            WhoToken::parse(&format!("{identity_ref}.***")),
            Err(WhoTokenError::InvalidEncoding)
        );
        assert_eq!(
            WhoToken::parse(&format!("{identity_ref}.{short_tag}")),
            Err(WhoTokenError::InvalidTagLength)
        );
    }

    #[test]
    fn test_debug_redacts_tag() {
        let token = WhoToken::from_parts(IdentityRef::new(), [9u8; TAG_LEN]);
        let debug = format!("{token:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&to_base64_url(&[9u8; TAG_LEN])));
    }
}
