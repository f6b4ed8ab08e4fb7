//! Pseudonymous identity derivation.
//!
//! An identity is a SHA-256 digest over connection metadata (client IP,
//! User-Agent, Accept-Language, Accept-Encoding). It is a stable lookup key
//! for metering, not an authentication primitive: clients behind the same
//! NAT or proxy with the same browser collide into one account, and that is
//! accepted. Nothing security-sensitive may be gated on it.

use std::fmt;
use std::net::SocketAddr;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque identity digest (64 hex chars), used as the ledger/request key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub(crate) fn from_digest(digest: String) -> Self {
        Self(digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for admin display; never used as a lookup key
    pub fn truncated(&self) -> String {
        let head = self.0.get(..8).unwrap_or(&self.0);
        format!("{head}...")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection metadata an identity is derived from
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub accept_encoding: String,
    pub accept_language: String,
    pub ip: String,
    pub user_agent: String,
}

impl ClientMeta {
    /// Extract metadata from the peer address and request headers.
    ///
    /// The first `X-Forwarded-For` entry wins over the socket peer so that
    /// deployments behind a reverse proxy still distinguish clients.
    pub fn from_request(addr: &SocketAddr, headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| addr.ip().to_string());

        Self {
            accept_encoding: header("accept-encoding"),
            accept_language: header("accept-language"),
            ip,
            user_agent: header("user-agent"),
        }
    }
}

/// Derive the identity digest for the given metadata. Pure and deterministic.
pub fn derive(meta: &ClientMeta) -> Identity {
    let ip = normalize_ip(&meta.ip);
    let fingerprint = format!(
        "{}-{}-{}-{}",
        ip, meta.user_agent, meta.accept_language, meta.accept_encoding
    );

    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    Identity(hex::encode(hasher.finalize()))
}

/// Loopback addresses collapse to one canonical form so local testing
/// always yields the same identity.
fn normalize_ip(ip: &str) -> &str {
    match ip {
        "::1" | "127.0.0.1" | "localhost" => "127.0.0.1",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(ip: &str, ua: &str) -> ClientMeta {
        ClientMeta {
            accept_encoding: "gzip".to_string(),
            accept_language: "en-US".to_string(),
            ip: ip.to_string(),
            user_agent: ua.to_string(),
        }
    }

    #[test]
    fn test_derive_is_deterministic() {
        let m = meta("10.1.2.3", "Mozilla/5.0");
        assert_eq!(derive(&m), derive(&m));
        assert_eq!(derive(&m).as_str().len(), 64);
    }

    #[test]
    fn test_loopback_addresses_collapse() {
        let v4 = derive(&meta("127.0.0.1", "Mozilla/5.0"));
        let v6 = derive(&meta("::1", "Mozilla/5.0"));
        let name = derive(&meta("localhost", "Mozilla/5.0"));
        assert_eq!(v4, v6);
        assert_eq!(v4, name);
    }

    #[test]
    fn test_distinct_metadata_distinct_identity() {
        let a = derive(&meta("10.1.2.3", "Mozilla/5.0"));
        let b = derive(&meta("10.1.2.4", "Mozilla/5.0"));
        let c = derive(&meta("10.1.2.3", "curl/8.0"));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_truncated_display() {
        let id = derive(&meta("10.1.2.3", "Mozilla/5.0"));
        let short = id.truncated();
        assert_eq!(short.len(), 11);
        assert!(id.as_str().starts_with(&short[..8]));
    }

    #[test]
    fn test_forwarded_for_wins_over_peer() {
        let addr: SocketAddr = "192.168.0.9:4242".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());

        let m = ClientMeta::from_request(&addr, &headers);
        assert_eq!(m.ip, "203.0.113.7");

        let m = ClientMeta::from_request(&addr, &HeaderMap::new());
        assert_eq!(m.ip, "192.168.0.9");
    }
}
