//! Application Configuration
//!
//! Configuration for the Auth application layer. Built once at startup and
//! shared as `Arc<AuthConfig>`; nothing here is read from process-wide state.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::time::Duration;

use platform::password::{DEFAULT_MAX_ITERATIONS, DEFAULT_MIN_PASSWORD_LENGTH, DEFAULT_SALT_BYTES};
use platform::rate_limit::RateLimitConfig;

/// What to do when the throttle store cannot answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Reject with `auth_backend_unavailable`
    #[default]
    Deny,
    /// Let the request through and log a warning
    Allow,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deny" => Ok(Self::Deny),
            "allow" => Ok(Self::Allow),
            other => Err(format!("unknown failure policy `{other}` (expected deny|allow)")),
        }
    }
}

/// Auth application configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Fixed-window throttle (default 30 requests per 60 seconds)
    pub throttle: RateLimitConfig,
    /// Client addresses never throttled
    pub whitelist_ips: HashSet<IpAddr>,
    /// Identity refs allowed to skip signature verification
    pub developer_refs: HashSet<String>,
    /// Identity refs never throttled (integration testing)
    pub throttle_exempt_refs: HashSet<String>,
    /// Read the client address from X-Forwarded-For
    pub trust_forwarded_for: bool,
    /// Lowest accepted PBKDF2 iteration count at registration/reset
    pub min_iterations: u32,
    /// Highest accepted PBKDF2 iteration count at registration/reset
    pub max_iterations: u32,
    /// Iteration count used when the client does not ask for one
    pub default_iterations: u32,
    /// Minimum password length in characters
    pub min_password_length: usize,
    /// Random salt length in bytes
    pub salt_bytes: usize,
    /// Upper bound for a single store call
    pub store_timeout: Duration,
    pub throttle_failure_policy: FailurePolicy,
    /// How long consumed tokens are remembered (`None` = forever)
    pub replay_retention: Option<Duration>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            throttle: RateLimitConfig::new(30, 60),
            whitelist_ips: HashSet::new(),
            developer_refs: HashSet::new(),
            throttle_exempt_refs: HashSet::new(),
            trust_forwarded_for: false,
            min_iterations: 10_000,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            default_iterations: 10_000,
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
            salt_bytes: DEFAULT_SALT_BYTES,
            store_timeout: Duration::from_secs(2),
            throttle_failure_policy: FailurePolicy::Deny,
            replay_retention: None,
        }
    }
}

impl AuthConfig {
    /// Create config for development (loopback is never throttled)
    pub fn development() -> Self {
        Self {
            whitelist_ips: HashSet::from([
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(Ipv6Addr::LOCALHOST),
            ]),
            ..Self::default()
        }
    }

    pub fn is_developer(&self, identity_ref: &str) -> bool {
        self.developer_refs.contains(identity_ref)
    }

    pub fn is_throttle_exempt(&self, identity_ref: Option<&str>, client_ip: Option<IpAddr>) -> bool {
        client_ip.is_some_and(|ip| self.whitelist_ips.contains(&ip))
            || identity_ref.is_some_and(|r| self.throttle_exempt_refs.contains(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.throttle.max_requests, 30);
        assert_eq!(config.throttle.window, Duration::from_secs(60));
        assert_eq!(config.throttle_failure_policy, FailurePolicy::Deny);
        assert!(config.replay_retention.is_none());
        assert!(config.default_iterations >= config.min_iterations);
        assert!(config.default_iterations <= config.max_iterations);
    }

    #[test]
    fn test_failure_policy_from_str() {
        assert_eq!("deny".parse(), Ok(FailurePolicy::Deny));
        assert_eq!(" Allow ".parse(), Ok(FailurePolicy::Allow));
        assert!("maybe".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_exemptions_are_exact() {
        let mut config = AuthConfig::development();
        config.throttle_exempt_refs.insert("tester".to_string());
        config.developer_refs.insert("dev".to_string());

        assert!(config.is_throttle_exempt(None, Some("127.0.0.1".parse().unwrap())));
        assert!(config.is_throttle_exempt(Some("tester"), None));
        assert!(!config.is_throttle_exempt(Some("tester2"), Some("10.0.0.1".parse().unwrap())));
        assert!(config.is_developer("dev"));
        assert!(!config.is_developer("Dev"));
        assert!(!config.is_developer("developer"));
    }
}
