//! Rate Limiting Infrastructure
//!
//! Fixed-window arithmetic shared by every throttled surface.
//! Windows are aligned to the epoch: `window_start = (now / window) * window`.

use std::time::Duration;

/// Rate limit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    pub fn window_ms(&self) -> i64 {
        (self.window.as_millis() as i64).max(1)
    }

    /// Start of the window containing `now_ms`
    pub fn window_start_ms(&self, now_ms: i64) -> i64 {
        let window_ms = self.window_ms();
        now_ms.div_euclid(window_ms) * window_ms
    }

    /// End (exclusive) of the window containing `now_ms`
    pub fn reset_at_ms(&self, now_ms: i64) -> i64 {
        self.window_start_ms(now_ms) + self.window_ms()
    }

    /// Evaluate a post-increment counter value
    pub fn evaluate(&self, count: u64, now_ms: i64) -> RateLimitResult {
        let limit = u64::from(self.max_requests);
        RateLimitResult {
            allowed: count <= limit,
            count,
            remaining: limit.saturating_sub(count) as u32,
            reset_at_ms: self.reset_at_ms(now_ms),
        }
    }
}

/// Rate limit check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Counter value after this request was recorded
    pub count: u64,
    pub remaining: u32,
    pub reset_at_ms: i64,
}

impl RateLimitResult {
    /// Seconds until the current window closes (at least 1)
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let remaining_ms = (self.reset_at_ms - now_ms).max(0) as u64;
        remaining_ms.div_ceil(1000).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_alignment() {
        let config = RateLimitConfig::new(30, 60);
        assert_eq!(config.window_start_ms(0), 0);
        assert_eq!(config.window_start_ms(59_999), 0);
        assert_eq!(config.window_start_ms(60_000), 60_000);
        assert_eq!(config.window_start_ms(125_000), 120_000);
        assert_eq!(config.reset_at_ms(125_000), 180_000);
    }

    #[test]
    fn test_evaluate_boundary() {
        let config = RateLimitConfig::new(30, 60);
        let at_limit = config.evaluate(30, 1_000);
        assert!(at_limit.allowed);
        assert_eq!(at_limit.remaining, 0);

        let over = config.evaluate(31, 1_000);
        assert!(!over.allowed);
        assert_eq!(over.remaining, 0);
        assert_eq!(over.reset_at_ms, 60_000);
    }

    #[test]
    fn test_retry_after() {
        let config = RateLimitConfig::new(1, 60);
        let result = config.evaluate(2, 59_500);
        assert_eq!(result.retry_after_secs(59_500), 1);
        let result = config.evaluate(2, 1_000);
        assert_eq!(result.retry_after_secs(1_000), 59);
    }
}
