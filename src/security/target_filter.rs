//! Target safety filter.
//!
//! # Responsibilities
//! - Reject targets whose scheme is not http/https
//! - Reject targets whose host equals, or is literally prefixed by, a
//!   denylist entry (loopback names and private IPv4 prefixes by default)
//!
//! # Known gaps
//! The check is a string comparison against the host as it appears in the
//! parsed URL, made before any name resolution. It does not stop:
//! - DNS names that resolve to private addresses (including rebinding)
//! - IPv6 private/link-local ranges other than the literal `::1`
//! - IPv4-mapped IPv6 literals such as `::ffff:127.0.0.1`
//!
//! Numeric IPv4 spellings (`0x7f.1`, `2130706433`) are normalized to dotted
//! form by URL parsing and are therefore caught. Prefix matching also
//! rejects names such as `localhost.example.com` or `10.example.org`.

use url::Url;

use crate::config::SafetyConfig;
use crate::error::ProxyError;
use crate::proxy::target::ProxySpec;

/// Literal-prefix host denylist.
#[derive(Debug, Clone)]
pub struct TargetFilter {
    blocked: Vec<String>,
}

impl TargetFilter {
    pub fn new(blocked: impl IntoIterator<Item = String>) -> Self {
        Self {
            blocked: blocked.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &SafetyConfig) -> Self {
        Self::new(config.blocked_hosts.iter().cloned())
    }

    /// Check a resolved target before any network activity.
    pub fn check(&self, spec: &ProxySpec) -> Result<(), ProxyError> {
        self.check_parts(&spec.scheme, &spec.host)
    }

    /// Check an arbitrary URL (used for redirect hops).
    pub fn check_url(&self, url: &Url) -> Result<(), ProxyError> {
        self.check_parts(url.scheme(), url.host_str().unwrap_or_default())
    }

    /// True if the host matches a denylist entry.
    pub fn is_blocked_host(&self, host: &str) -> bool {
        let host = host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase();
        self.blocked.iter().any(|entry| host.starts_with(entry.as_str()))
    }

    fn check_parts(&self, scheme: &str, host: &str) -> Result<(), ProxyError> {
        if !matches!(scheme, "http" | "https") {
            return Err(ProxyError::UnsupportedProtocol(scheme.to_string()));
        }
        if self.is_blocked_host(host) {
            return Err(ProxyError::ForbiddenTarget(host.to_string()));
        }
        Ok(())
    }
}

impl Default for TargetFilter {
    fn default() -> Self {
        Self::from_config(&SafetyConfig::default())
    }
}
