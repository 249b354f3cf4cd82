//! Throttle Meter
//!
//! Fixed-window request counting per client fingerprint. Counters live in
//! the key-value store under `throttle:<fingerprint>:<window_start_ms>` and
//! expire one window after creation.

use std::net::IpAddr;
use std::sync::Arc;

use platform::client::ClientFingerprint;
use platform::kv::{KvStore, bounded};
use platform::rate_limit::RateLimitResult;

use crate::application::config::{AuthConfig, FailurePolicy};
use crate::error::{AuthError, AuthResult};

const KEY_PREFIX: &str = "throttle:";

pub struct ThrottleMeter<K>
where
    K: KvStore,
{
    store: Arc<K>,
    config: Arc<AuthConfig>,
}

impl<K> ThrottleMeter<K>
where
    K: KvStore + Sync,
{
    pub fn new(store: Arc<K>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    pub fn key_for(&self, fingerprint: &ClientFingerprint, now_ms: i64) -> String {
        format!(
            "{}{}:{}",
            KEY_PREFIX,
            fingerprint.key(),
            self.config.throttle.window_start_ms(now_ms)
        )
    }

    /// Whitelisted addresses and exempt refs skip throttling entirely
    pub fn is_exempt(&self, identity_ref: Option<&str>, client_ip: Option<IpAddr>) -> bool {
        self.config.is_throttle_exempt(identity_ref, client_ip)
    }

    /// Count this request against the fingerprint's current window
    pub async fn check_and_increment(
        &self,
        fingerprint: &ClientFingerprint,
        now_ms: i64,
    ) -> AuthResult<RateLimitResult> {
        let limit = self.config.throttle;
        let key = self.key_for(fingerprint, now_ms);

        let count = match bounded(
            self.config.store_timeout,
            self.store.increment(&key, Some(limit.window)),
        )
        .await
        {
            Ok(count) => count,
            Err(e) => {
                return match self.config.throttle_failure_policy {
                    FailurePolicy::Deny => {
                        tracing::error!(error = %e, fingerprint = %fingerprint, "Throttle store failure");
                        Err(AuthError::from(e))
                    }
                    FailurePolicy::Allow => {
                        tracing::warn!(
                            error = %e,
                            fingerprint = %fingerprint,
                            "Throttle store failure, allowing request"
                        );
                        Ok(limit.evaluate(0, now_ms))
                    }
                };
            }
        };

        let result = limit.evaluate(count, now_ms);
        if !result.allowed {
            tracing::warn!(
                fingerprint = %fingerprint,
                count = count,
                max = limit.max_requests,
                "Rate limit exceeded"
            );
            return Err(AuthError::RateLimited {
                retry_after_secs: result.retry_after_secs(now_ms),
            });
        }

        Ok(result)
    }

    /// Read the current window's count without recording a request
    pub async fn current_count(
        &self,
        fingerprint: &ClientFingerprint,
        now_ms: i64,
    ) -> AuthResult<u64> {
        let key = self.key_for(fingerprint, now_ms);
        let count = bounded(self.config.store_timeout, self.store.get(&key)).await?;
        Ok(count.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::kv::MemoryKvStore;
    use platform::rate_limit::RateLimitConfig;

    fn meter(max_requests: u32) -> ThrottleMeter<MemoryKvStore> {
        let config = AuthConfig {
            throttle: RateLimitConfig::new(max_requests, 60),
            ..AuthConfig::default()
        };
        ThrottleMeter::new(Arc::new(MemoryKvStore::new()), Arc::new(config))
    }

    #[tokio::test]
    async fn test_limit_then_rollover() {
        let meter = meter(3);
        let fp = ClientFingerprint::Identity("abc".to_string());
        let now = 1_000;

        for expected_remaining in [2, 1, 0] {
            let result = meter.check_and_increment(&fp, now).await.unwrap();
            assert_eq!(result.remaining, expected_remaining);
        }

        let err = meter.check_and_increment(&fp, now).await.unwrap_err();
        assert!(matches!(err, AuthError::RateLimited { retry_after_secs: 59 }));

        // next window
        assert!(meter.check_and_increment(&fp, 60_000).await.is_ok());
        assert_eq!(meter.current_count(&fp, 60_000).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fingerprints_are_independent() {
        let meter = meter(1);
        let a = ClientFingerprint::Identity("a".to_string());
        let b = ClientFingerprint::Ip("10.0.0.1".parse().unwrap());

        assert!(meter.check_and_increment(&a, 0).await.is_ok());
        assert!(meter.check_and_increment(&b, 0).await.is_ok());
        assert!(meter.check_and_increment(&a, 0).await.is_err());
    }

    #[test]
    fn test_key_layout() {
        let meter = meter(1);
        let fp = ClientFingerprint::Identity("abc".to_string());
        assert_eq!(meter.key_for(&fp, 125_000), "throttle:id:abc:120000");
    }
}
