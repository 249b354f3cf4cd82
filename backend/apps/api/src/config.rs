//! Server Configuration
//!
//! Read once from the environment at startup. Parsing works on any lookup
//! function so it can be exercised without touching process state.

use anyhow::{Context, bail};
use auth::{AuthConfig, FailurePolicy};
use platform::rate_limit::RateLimitConfig;
use std::collections::HashSet;
use std::hash::Hash;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:31113";
const DEFAULT_FRONTEND_ORIGINS: &str = "http://localhost:40922,http://127.0.0.1:40922";

/// Where replay records and throttle counters live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvBackend {
    /// Shared across instances
    Postgres,
    /// Process-local; single-instance deployments only
    Memory,
}

impl FromStr for KvBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown kv backend `{other}` (expected postgres|memory)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub frontend_origins: Vec<String>,
    pub kv_backend: KvBackend,
    pub auth: AuthConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let bind_addr: SocketAddr =
            parse_or(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse::<SocketAddr>()?)?;
        let frontend_origins = list(
            &lookup("FRONTEND_ORIGINS").unwrap_or_else(|| DEFAULT_FRONTEND_ORIGINS.to_string()),
        );
        let kv_backend = parse_or(&lookup, "AUTH_KV_BACKEND", KvBackend::Postgres)?;

        let defaults = if cfg!(debug_assertions) {
            AuthConfig::development()
        } else {
            AuthConfig::default()
        };

        let throttle = RateLimitConfig::new(
            parse_or(&lookup, "AUTH_THROTTLE_LIMIT", defaults.throttle.max_requests)?,
            parse_or(
                &lookup,
                "AUTH_THROTTLE_WINDOW_SECS",
                defaults.throttle.window.as_secs(),
            )?,
        );
        if throttle.max_requests == 0 || throttle.window.is_zero() {
            bail!("AUTH_THROTTLE_LIMIT and AUTH_THROTTLE_WINDOW_SECS must be positive");
        }

        let mut whitelist_ips = parse_set::<IpAddr>(&lookup, "AUTH_WHITELIST_IPS")?;
        whitelist_ips.extend(defaults.whitelist_ips.iter().copied());

        let min_iterations = parse_or(&lookup, "AUTH_MIN_ITERATIONS", defaults.min_iterations)?;
        let max_iterations = parse_or(&lookup, "AUTH_MAX_ITERATIONS", defaults.max_iterations)?;
        if max_iterations < min_iterations {
            bail!("AUTH_MAX_ITERATIONS ({max_iterations}) is below AUTH_MIN_ITERATIONS ({min_iterations})");
        }
        let default_iterations = parse_or(
            &lookup,
            "AUTH_DEFAULT_ITERATIONS",
            defaults.default_iterations.clamp(min_iterations, max_iterations),
        )?;
        if !(min_iterations..=max_iterations).contains(&default_iterations) {
            bail!(
                "AUTH_DEFAULT_ITERATIONS ({default_iterations}) must be within \
                 AUTH_MIN_ITERATIONS..=AUTH_MAX_ITERATIONS ({min_iterations}..={max_iterations})"
            );
        }

        let replay_retention = match lookup("AUTH_REPLAY_RETENTION_SECS") {
            None => defaults.replay_retention,
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("AUTH_REPLAY_RETENTION_SECS: invalid value `{raw}`"))?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
        };

        let auth = AuthConfig {
            throttle,
            whitelist_ips,
            developer_refs: parse_set(&lookup, "AUTH_DEVELOPER_REFS")?,
            throttle_exempt_refs: parse_set(&lookup, "AUTH_THROTTLE_EXEMPT_REFS")?,
            trust_forwarded_for: parse_or(
                &lookup,
                "AUTH_TRUST_FORWARDED_FOR",
                defaults.trust_forwarded_for,
            )?,
            min_iterations,
            max_iterations,
            default_iterations,
            store_timeout: Duration::from_millis(parse_or(
                &lookup,
                "AUTH_STORE_TIMEOUT_MS",
                defaults.store_timeout.as_millis() as u64,
            )?),
            throttle_failure_policy: match lookup("AUTH_THROTTLE_FAILURE_POLICY") {
                None => defaults.throttle_failure_policy,
                Some(raw) => raw
                    .parse::<FailurePolicy>()
                    .map_err(|e| anyhow::anyhow!("AUTH_THROTTLE_FAILURE_POLICY: {e}"))?,
            },
            replay_retention,
            ..defaults
        };

        Ok(Self {
            database_url,
            bind_addr,
            frontend_origins,
            kv_backend,
            auth,
        })
    }
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{name}: invalid value `{raw}`: {e}")),
    }
}

fn parse_set<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<HashSet<T>>
where
    T: FromStr + Eq + Hash,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return Ok(HashSet::new());
    };
    list(&raw)
        .into_iter()
        .map(|item| {
            item.parse()
                .map_err(|e| anyhow::anyhow!("{name}: invalid entry `{item}`: {e}"))
        })
        .collect()
}
