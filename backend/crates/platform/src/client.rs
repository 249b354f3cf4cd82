//! Client identification utilities
//!
//! Common functions for identifying clients via HTTP headers.

use axum::http::HeaderMap;
use std::fmt;
use std::net::IpAddr;

/// What a request is counted against for throttling
///
/// Authenticated requests count against the resolved identity; anonymous
/// ones (login, register) against the client address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientFingerprint {
    Identity(String),
    Ip(IpAddr),
    Unknown,
}

impl ClientFingerprint {
    /// Stable key fragment for counters
    pub fn key(&self) -> String {
        match self {
            Self::Identity(id) => format!("id:{id}"),
            Self::Ip(ip) => format!("ip:{ip}"),
            Self::Unknown => "unknown".to_string(),
        }
    }
}

impl fmt::Display for ClientFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Extract client IP address from headers
///
/// X-Forwarded-For is only honoured when `trust_forwarded_for` is set
/// (deployments behind a reverse proxy); otherwise the header is client
/// controlled and would let anyone pick their own throttle bucket.
/// Only the rightmost entry is used: it is the one appended by the proxy
/// in front of us, while everything to its left came from the client.
///
/// ## Arguments
/// * `headers` - HTTP request headers
/// * `direct_ip` - Direct connection IP address
/// * `trust_forwarded_for` - Whether to read X-Forwarded-For
///
/// ## Returns
/// The client IP address, or None if not determinable
pub fn extract_client_ip(
    headers: &HeaderMap,
    direct_ip: Option<IpAddr>,
    trust_forwarded_for: bool,
) -> Option<IpAddr> {
    if trust_forwarded_for {
        if let Some(ip) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|xff| xff.rsplit(',').map(str::trim).find(|entry| !entry.is_empty()))
            .and_then(|last| last.parse::<IpAddr>().ok())
        {
            return Some(ip);
        }
    }
    direct_ip
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn forwarded_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );
        headers
    }

    #[test]
    fn test_extract_client_ip_xff_trusted() {
        let ip = extract_client_ip(&forwarded_headers(), None, true);
        assert_eq!(ip, Some("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_extract_client_ip_ignores_client_supplied_entries() {
        let direct: IpAddr = "172.16.0.2".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("127.0.0.1, 203.0.113.9, "),
        );
        assert_eq!(
            extract_client_ip(&headers, Some(direct), true),
            Some("203.0.113.9".parse().unwrap())
        );

        headers.insert("x-forwarded-for", HeaderValue::from_static("127.0.0.1, garbage"));
        assert_eq!(extract_client_ip(&headers, Some(direct), true), Some(direct));
    }

    #[test]
    fn test_extract_client_ip_xff_untrusted() {
        let direct: IpAddr = "127.0.0.1".parse().unwrap();
        let ip = extract_client_ip(&forwarded_headers(), Some(direct), false);
        assert_eq!(ip, Some(direct));
    }

    #[test]
    fn test_extract_client_ip_direct() {
        let headers = HeaderMap::new();
        let direct: IpAddr = "127.0.0.1".parse().unwrap();

        let ip = extract_client_ip(&headers, Some(direct), true);
        assert_eq!(ip, Some(direct));
    }

    #[test]
    fn test_fingerprint_keys() {
        assert_eq!(
            ClientFingerprint::Identity("abc".to_string()).key(),
            "id:abc"
        );
        assert_eq!(
            ClientFingerprint::Ip("10.0.0.1".parse().unwrap()).key(),
            "ip:10.0.0.1"
        );
        assert_eq!(ClientFingerprint::Unknown.to_string(), "unknown");
    }
}
