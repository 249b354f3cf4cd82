//! Password Hashing and Verification
//!
//! Salted, iterated PBKDF2-HMAC-SHA256. The derived value doubles as the
//! request-signing key: clients that know the password, the salt and the
//! iteration count derive the same 32 bytes locally, so the server never
//! needs to receive the derived key itself.
//!
//! ## Security Features
//! - Per-identity random salt and tunable iteration count
//! - Iteration count bounded (floor and ceiling) at registration time
//! - Zeroization of clear text passwords and derived keys
//! - Constant-time comparison

use std::fmt;

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{constant_time_eq, from_base64, random_bytes, to_base64, to_base64_url};

// ============================================================================
// Constants
// ============================================================================

/// Maximum password length in characters
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Default minimum password length in characters
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 4;

/// Derived key length in bytes (SHA-256 output size)
pub const DERIVED_KEY_LEN: usize = 32;

/// Random salt length in bytes before encoding
pub const DEFAULT_SALT_BYTES: usize = 16;

/// Maximum accepted salt length (encoded form)
pub const MAX_SALT_LENGTH: usize = 128;

/// Default ceiling for caller-supplied iteration counts
pub const DEFAULT_MAX_ITERATIONS: u32 = 1_000_000;

// ============================================================================
// Error Types
// ============================================================================

/// Password policy violation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordPolicyError {
    #[error("Password must be at least {min} characters (got {actual})")]
    TooShort { min: usize, actual: usize },

    #[error("Password must be at most {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },

    #[error("Password cannot be empty or contain only whitespace")]
    EmptyOrWhitespace,

    #[error("Password contains invalid control characters")]
    InvalidCharacter,

    /// Caller asked for fewer iterations than the configured floor
    #[error("Iteration count must be at least {min} (got {actual})")]
    IterationsTooLow { min: u32, actual: u32 },

    /// Caller asked for more iterations than the configured ceiling
    #[error("Iteration count must be at most {max} (got {actual})")]
    IterationsTooHigh { max: u32, actual: u32 },

    #[error("Salt must be 1 to {max} printable characters without whitespace")]
    InvalidSalt { max: usize },
}

/// Errors raised while loading stored credential material
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordHashError {
    #[error("Invalid password hash format")]
    InvalidHashFormat,

    #[error("Invalid stored iteration count: {0}")]
    InvalidIterations(i64),
}

// ============================================================================
// Clear Text Password (Zeroized on drop)
// ============================================================================

/// Clear text password with automatic memory zeroization
///
/// Does not implement `Clone`; `Debug` output is redacted. The bytes are used
/// exactly as received (no Unicode normalization) because clients derive the
/// signing key from the same bytes.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ClearTextPassword(String);

impl ClearTextPassword {
    /// Create a new password for registration or reset, enforcing policy
    pub fn new(raw: String, min_length: usize) -> Result<Self, PasswordPolicyError> {
        if raw.trim().is_empty() {
            return Err(PasswordPolicyError::EmptyOrWhitespace);
        }

        let char_count = raw.chars().count();
        if char_count < min_length {
            return Err(PasswordPolicyError::TooShort {
                min: min_length,
                actual: char_count,
            });
        }
        if char_count > MAX_PASSWORD_LENGTH {
            return Err(PasswordPolicyError::TooLong {
                max: MAX_PASSWORD_LENGTH,
                actual: char_count,
            });
        }

        if raw.chars().any(|ch| ch.is_control()) {
            return Err(PasswordPolicyError::InvalidCharacter);
        }

        Ok(Self(raw))
    }

    /// Wrap a login candidate without applying the registration policy
    ///
    /// Policy changes must not lock out identities registered under an
    /// older policy, so candidates are only ever compared, never validated.
    pub fn candidate(raw: String) -> Self {
        Self(raw)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Derive the verifiable hash (and signing key) for this password
    pub fn derive_key(&self, salt: &Salt, iterations: Iterations) -> DerivedKey {
        derive_hash(self.as_bytes(), salt, iterations)
    }
}

impl fmt::Debug for ClearTextPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClearTextPassword")
            .field(&"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Salt / Iterations
// ============================================================================

/// Per-identity salt
///
/// The UTF-8 bytes of the string are fed to PBKDF2, so the exact string the
/// client receives at login is what it must use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt(String);

impl Salt {
    /// Generate a random URL-safe salt
    pub fn generate(byte_len: usize) -> Self {
        Self(to_base64_url(&random_bytes(byte_len)))
    }

    /// Accept an explicit salt (fixtures, imports)
    pub fn new(value: impl Into<String>) -> Result<Self, PasswordPolicyError> {
        let value = value.into();
        let valid = !value.is_empty()
            && value.len() <= MAX_SALT_LENGTH
            && value.chars().all(|c| c.is_ascii_graphic());
        if !valid {
            return Err(PasswordPolicyError::InvalidSalt {
                max: MAX_SALT_LENGTH,
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// PBKDF2 iteration count (cost factor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Iterations(u32);

impl Iterations {
    /// Validate a caller-supplied count against the configured bounds
    pub fn new(count: u32, min: u32, max: u32) -> Result<Self, PasswordPolicyError> {
        if count < min.max(1) {
            return Err(PasswordPolicyError::IterationsTooLow {
                min: min.max(1),
                actual: count,
            });
        }
        if count > max {
            return Err(PasswordPolicyError::IterationsTooHigh { max, actual: count });
        }
        Ok(Self(count))
    }

    /// Load a stored count. The registration floor is not re-applied.
    pub fn from_stored(count: i64) -> Result<Self, PasswordHashError> {
        u32::try_from(count)
            .ok()
            .filter(|&c| c > 0)
            .map(Self)
            .ok_or(PasswordHashError::InvalidIterations(count))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

// ============================================================================
// Derived Key (stored hash + signing key)
// ============================================================================

/// PBKDF2 output; stored as the password hash and used as the HMAC key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; DERIVED_KEY_LEN]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; DERIVED_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode from the stored (standard base64) form
    pub fn from_stored(encoded: &str) -> Result<Self, PasswordHashError> {
        let bytes = from_base64(encoded).map_err(|_| PasswordHashError::InvalidHashFormat)?;
        let bytes: [u8; DERIVED_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| PasswordHashError::InvalidHashFormat)?;
        Ok(Self(bytes))
    }

    /// Encode for storage
    pub fn to_stored(&self) -> String {
        to_base64(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Constant-time equality
    pub fn matches(&self, other: &DerivedKey) -> bool {
        constant_time_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DerivedKey").field(&"[REDACTED]").finish()
    }
}

// ============================================================================
// Hashing
// ============================================================================

/// `deriveHash(rawPassword, salt, iterations)`
pub fn derive_hash(password: &[u8], salt: &Salt, iterations: Iterations) -> DerivedKey {
    let mut out = [0u8; DERIVED_KEY_LEN];
    pbkdf2_hmac::<Sha256>(password, salt.as_str().as_bytes(), iterations.get(), &mut out);
    let key = DerivedKey(out);
    out.zeroize();
    key
}

/// Verify a candidate password against stored credential material
///
/// Uses constant-time comparison to prevent timing attacks.
pub fn verify(
    candidate: &ClearTextPassword,
    salt: &Salt,
    iterations: Iterations,
    stored: &DerivedKey,
) -> bool {
    candidate.derive_key(salt, iterations).matches(stored)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pbkdf2_known_vector() {
        // PBKDF2-HMAC-SHA256("password", "salt", c, 32)
        let salt = Salt::new("salt").unwrap();

        let key = derive_hash(b"password", &salt, Iterations::new(1, 1, u32::MAX).unwrap());
        assert_eq!(
            hex::encode(key.as_bytes()),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );

        let key = derive_hash(b"password", &salt, Iterations::new(4096, 1, u32::MAX).unwrap());
        assert_eq!(
            hex::encode(key.as_bytes()),
            "c5e478d59288c841aa530db6845c4c8d962893a001ce4e11a4963873aa98134a"
        );
    }

    #[test]
    fn test_derivation_is_deterministic_and_salted() {
        let password = ClearTextPassword::new("1q1q".to_string(), 4).unwrap();
        let iterations = Iterations::new(1000, 1000, u32::MAX).unwrap();
        let s1 = Salt::new("s1").unwrap();
        let s2 = Salt::new("s2").unwrap();

        let a = password.derive_key(&s1, iterations);
        let b = password.derive_key(&s1, iterations);
        let c = password.derive_key(&s2, iterations);

        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_verify() {
        let salt = Salt::new("s1").unwrap();
        let iterations = Iterations::new(1000, 1, u32::MAX).unwrap();
        let stored = ClearTextPassword::new("1q1q".to_string(), 4)
            .unwrap()
            .derive_key(&salt, iterations);

        let good = ClearTextPassword::candidate("1q1q".to_string());
        let bad = ClearTextPassword::candidate("1q1w".to_string());
        assert!(verify(&good, &salt, iterations, &stored));
        assert!(!verify(&bad, &salt, iterations, &stored));
    }

    #[test]
    fn test_iterations_bounds() {
        assert!(Iterations::new(10_000, 10_000, DEFAULT_MAX_ITERATIONS).is_ok());
        assert!(Iterations::new(DEFAULT_MAX_ITERATIONS, 10_000, DEFAULT_MAX_ITERATIONS).is_ok());
        assert_eq!(
            Iterations::new(999, 10_000, DEFAULT_MAX_ITERATIONS),
            Err(PasswordPolicyError::IterationsTooLow {
                min: 10_000,
                actual: 999
            })
        );
        assert_eq!(
            Iterations::new(u32::MAX, 10_000, DEFAULT_MAX_ITERATIONS),
            Err(PasswordPolicyError::IterationsTooHigh {
                max: DEFAULT_MAX_ITERATIONS,
                actual: u32::MAX
            })
        );
        assert!(Iterations::new(0, 0, DEFAULT_MAX_ITERATIONS).is_err());
    }

    #[test]
    fn test_iterations_from_stored() {
        assert_eq!(Iterations::from_stored(10_000).unwrap().get(), 10_000);
        assert!(Iterations::from_stored(0).is_err());
        assert!(Iterations::from_stored(-5).is_err());
        assert!(Iterations::from_stored(i64::MAX).is_err());
    }

    #[test]
    fn test_password_policy() {
        assert!(matches!(
            ClearTextPassword::new("".to_string(), 4),
            Err(PasswordPolicyError::EmptyOrWhitespace)
        ));
        assert!(matches!(
            ClearTextPassword::new("   ".to_string(), 1),
            Err(PasswordPolicyError::EmptyOrWhitespace)
        ));
        assert!(matches!(
            ClearTextPassword::new("abc".to_string(), 4),
            Err(PasswordPolicyError::TooShort { min: 4, actual: 3 })
        ));
        assert!(matches!(
            ClearTextPassword::new("a".repeat(MAX_PASSWORD_LENGTH + 1), 4),
            Err(PasswordPolicyError::TooLong { .. })
        ));
        assert!(matches!(
            ClearTextPassword::new("abc\u{7}def".to_string(), 4),
            Err(PasswordPolicyError::InvalidCharacter)
        ));
        assert!(ClearTextPassword::new("パスワード".to_string(), 4).is_ok());
    }

    #[test]
    fn test_salt() {
        let generated = Salt::generate(DEFAULT_SALT_BYTES);
        assert!(Salt::new(generated.as_str()).is_ok());
        assert_ne!(generated, Salt::generate(DEFAULT_SALT_BYTES));

        assert!(Salt::new("").is_err());
        assert!(Salt::new("has space").is_err());
        assert!(Salt::new("x".repeat(MAX_SALT_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_stored_roundtrip_and_rejects_garbage() {
        let key = DerivedKey::from_bytes([9u8; DERIVED_KEY_LEN]);
        let restored = DerivedKey::from_stored(&key.to_stored()).unwrap();
        assert!(key.matches(&restored));

        assert!(DerivedKey::from_stored("not base64!").is_err());
        assert!(DerivedKey::from_stored(&to_base64(&[1u8; 16])).is_err());
    }

    #[test]
    fn test_debug_redaction() {
        let password = ClearTextPassword::candidate("secret".to_string());
        let debug_output = format!("{:?}", password);
        assert!(debug_output.contains("REDACTED"));
        assert!(!debug_output.contains("secret"));

        let key = DerivedKey::from_bytes([1u8; DERIVED_KEY_LEN]);
        assert!(format!("{:?}", key).contains("REDACTED"));
    }
}
