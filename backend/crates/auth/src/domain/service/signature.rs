//! Signature Engine
//!
//! Signs and verifies requests with the identity's derived key.
//!
//! ## Canonical form
//! The signed message is `METHOD "\n" canonical_target`, where the canonical
//! target is the request path followed by the query string with the `who`
//! parameter removed. Remaining parameters keep their order and their exact
//! bytes; nothing is decoded, sorted or case-folded, and a trailing slash is
//! part of the path. A signature therefore covers exactly one method on
//! exactly one URL.

use platform::crypto::{hmac_sha256, verify_hmac_sha256};
use platform::password::{ClearTextPassword, DerivedKey, Iterations, Salt};
use thiserror::Error;

use crate::domain::value_object::{
    identity_ref::IdentityRef,
    who_token::{WhoToken, WhoTokenError},
};

/// Query parameter carrying the token
pub const WHO_PARAM: &str = "who";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("more than one `{WHO_PARAM}` parameter")]
    DuplicateToken,
    #[error("malformed token: {0}")]
    Malformed(#[from] WhoTokenError),
    #[error("signature mismatch")]
    Mismatch,
}

/// Request target split into its signed part and the presented token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTarget {
    /// Path plus query without the `who` parameter
    pub canonical: String,
    /// Raw value of the `who` parameter, if present
    pub who: Option<String>,
}

/// Separate the `who` parameter from the rest of the target
pub fn split_target(path: &str, query: Option<&str>) -> Result<SignedTarget, SignatureError> {
    let mut who = None;
    let mut kept = Vec::new();

    for segment in query.unwrap_or_default().split('&') {
        let (name, value) = segment.split_once('=').unwrap_or((segment, ""));
        if name == WHO_PARAM {
            if who.replace(value.to_string()).is_some() {
                return Err(SignatureError::DuplicateToken);
            }
        } else if !segment.is_empty() {
            kept.push(segment);
        }
    }

    let canonical = if kept.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, kept.join("&"))
    };

    Ok(SignedTarget { canonical, who })
}

/// Split a `path?query` string
pub fn split_path_and_query(target: &str) -> (&str, Option<&str>) {
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}

fn message(method: &str, canonical_target: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(method.len() + 1 + canonical_target.len());
    message.extend_from_slice(method.as_bytes());
    message.push(b'\n');
    message.extend_from_slice(canonical_target.as_bytes());
    message
}

/// Compute the token for `method` on `canonical_target`
pub fn sign(
    key: &DerivedKey,
    identity_ref: IdentityRef,
    method: &str,
    canonical_target: &str,
) -> WhoToken {
    let tag = hmac_sha256(key.as_bytes(), &message(method, canonical_target));
    WhoToken::from_parts(identity_ref, tag)
}

/// Recompute and compare the token's tag in constant time
///
/// `key` is the current key of the identity named in the token, or `None`
/// when no such identity exists; both failures look the same to the caller.
pub fn verify(
    token: &WhoToken,
    method: &str,
    canonical_target: &str,
    key: Option<&DerivedKey>,
) -> Result<IdentityRef, SignatureError> {
    let key = key.ok_or(SignatureError::Mismatch)?;
    if verify_hmac_sha256(
        key.as_bytes(),
        &message(method, canonical_target),
        token.tag(),
    ) {
        Ok(*token.identity_ref())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Client-side signing state: identity ref plus derived key
///
/// Held by clients after login; never persisted by the server.
#[derive(Debug, Clone)]
pub struct SigningContext {
    identity_ref: IdentityRef,
    derived_key: DerivedKey,
}

impl SigningContext {
    pub fn new(identity_ref: IdentityRef, derived_key: DerivedKey) -> Self {
        Self {
            identity_ref,
            derived_key,
        }
    }

    /// Derive the key from the parameters returned by login
    pub fn derive(
        identity_ref: IdentityRef,
        password: &str,
        salt: &Salt,
        iterations: Iterations,
    ) -> Self {
        let password = ClearTextPassword::candidate(password.to_string());
        Self::new(identity_ref, password.derive_key(salt, iterations))
    }

    pub fn identity_ref(&self) -> &IdentityRef {
        &self.identity_ref
    }

    /// Token for `method` on `target` (`path` or `path?query`)
    pub fn sign(&self, method: &str, target: &str) -> Result<WhoToken, SignatureError> {
        let (path, query) = split_path_and_query(target);
        let signed = split_target(path, query)?;
        Ok(sign(
            &self.derived_key,
            self.identity_ref,
            method,
            &signed.canonical,
        ))
    }

    /// `target` with the `who` parameter appended
    pub fn signed_target(&self, method: &str, target: &str) -> Result<String, SignatureError> {
        let (path, query) = split_path_and_query(target);
        let signed = split_target(path, query)?;
        let token = sign(
            &self.derived_key,
            self.identity_ref,
            method,
            &signed.canonical,
        );
        let separator = if signed.canonical.contains('?') {
            '&'
        } else {
            '?'
        };
        Ok(format!(
            "{}{}{}={}",
            signed.canonical, separator, WHO_PARAM, token
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SigningContext {
        SigningContext::derive(
            IdentityRef::new(),
            "1q1q",
            &Salt::new("s1").unwrap(),
            Iterations::new(1_000, 1, u32::MAX).unwrap(),
        )
    }

    fn verify_uri(ctx: &SigningContext, method: &str, uri: &str) -> Result<IdentityRef, SignatureError> {
        let (path, query) = split_path_and_query(uri);
        let signed = split_target(path, query)?;
        let token = WhoToken::parse(signed.who.as_deref().unwrap_or_default())?;
        verify(&token, method, &signed.canonical, Some(&ctx.derived_key))
    }

    #[test]
    fn test_split_target_strips_who() {
        let signed = split_target("/tastings", Some("who=abc")).unwrap();
        assert_eq!(signed.canonical, "/tastings");
        assert_eq!(signed.who.as_deref(), Some("abc"));

        let signed = split_target("/tastings", Some("b=2&who=abc&a=1")).unwrap();
        assert_eq!(signed.canonical, "/tastings?b=2&a=1");

        let signed = split_target("/tastings", None).unwrap();
        assert_eq!(signed.canonical, "/tastings");
        assert_eq!(signed.who, None);
    }

    #[test]
    fn test_split_target_rejects_duplicate_who() {
        assert_eq!(
            split_target("/tastings", Some("who=a&who=b")),
            Err(SignatureError::DuplicateToken)
        );
    }

    #[test]
    fn test_signed_target_verifies() {
        let ctx = context();
        let uri = ctx.signed_target("GET", "/tastings").unwrap();
        assert!(uri.starts_with("/tastings?who="));
        assert_eq!(verify_uri(&ctx, "GET", &uri).unwrap(), *ctx.identity_ref());

        let uri = ctx.signed_target("GET", "/tastings?page=2").unwrap();
        assert!(uri.starts_with("/tastings?page=2&who="));
        assert!(verify_uri(&ctx, "GET", &uri).is_ok());
    }

    #[test]
    fn test_signing_is_deterministic() {
        let ctx = context();
        assert_eq!(
            ctx.sign("GET", "/tastings").unwrap(),
            ctx.sign("GET", "/tastings").unwrap()
        );
        assert_ne!(
            ctx.sign("GET", "/tastings").unwrap(),
            ctx.sign("GET", "/tastings/").unwrap()
        );
    }

    #[test]
    fn test_tampering_is_detected() {
        let ctx = context();
        let uri = ctx.signed_target("GET", "/tastings?page=2").unwrap();
        let who = uri.split_once("who=").unwrap().1;

        // method
        assert_eq!(
            verify_uri(&ctx, "POST", &uri),
            Err(SignatureError::Mismatch)
        );
        // path, case and trailing slash
        for path in ["/tasting", "/Tastings", "/tastings/"] {
            let tampered = format!("{path}?page=2&who={who}");
            assert_eq!(
                verify_uri(&ctx, "GET", &tampered),
                Err(SignatureError::Mismatch),
                "{tampered}"
            );
        }
        // query
        let tampered = format!("/tastings?page=3&who={who}");
        assert_eq!(
            verify_uri(&ctx, "GET", &tampered),
            Err(SignatureError::Mismatch)
        );
        // dropped parameter
        let tampered = format!("/tastings?who={who}");
        assert_eq!(
            verify_uri(&ctx, "GET", &tampered),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_key_or_unknown_identity() {
        let ctx = context();
        let other = SigningContext::derive(
            *ctx.identity_ref(),
            "2w2w",
            &Salt::new("s1").unwrap(),
            Iterations::new(1_000, 1, u32::MAX).unwrap(),
        );
        let token = ctx.sign("GET", "/tastings").unwrap();

        assert_eq!(
            verify(&token, "GET", "/tastings", Some(&other.derived_key)),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify(&token, "GET", "/tastings", None),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_malformed_token() {
        assert!(matches!(
            WhoToken::parse("garbage").map_err(SignatureError::from),
            Err(SignatureError::Malformed(_))
        ));
    }
}
