//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Path prefix, public origin and body limits.
    pub proxy: ProxySettings,

    /// Outbound client settings.
    pub upstream: UpstreamConfig,

    /// Target host denylist.
    pub safety: SafetyConfig,

    /// Request header sanitization.
    pub headers: HeaderConfig,

    /// Optional response cache.
    pub cache: CacheConfig,

    /// Usage page, index page and static assets.
    pub site: SiteConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Proxy path protocol settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Path prefix the target URL follows. Must start and end with `/`.
    pub prefix: String,

    /// Public origin of this proxy (e.g. "https://proxy.example.net").
    /// Derived from the inbound Host header when unset.
    pub public_origin: Option<String>,

    /// Scheme used with the Host header when `public_origin` is unset.
    pub public_scheme: String,

    /// Scheme prepended to targets given without one.
    pub default_scheme: String,

    /// Add `X-Proxy-Server` / `X-Proxied-URL` to responses.
    pub add_diagnostic_headers: bool,

    /// Advertise PATCH in `Access-Control-Allow-Methods`.
    pub allow_patch_method: bool,

    /// Largest HTML/CSS body buffered for rewriting, in bytes.
    pub max_rewrite_bytes: usize,

    /// Largest inbound request body forwarded, in bytes.
    pub max_request_body_bytes: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            prefix: "/proxy/".to_string(),
            public_origin: None,
            public_scheme: "http".to_string(),
            default_scheme: "https".to_string(),
            add_diagnostic_headers: true,
            allow_patch_method: true,
            max_rewrite_bytes: 10 * 1024 * 1024,
            max_request_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Outbound request settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Wall-clock bound for the whole upstream exchange in seconds.
    pub request_timeout_secs: u64,

    /// Follow 3xx responses instead of surfacing them.
    pub follow_redirects: bool,

    /// Maximum redirect hops when following.
    pub max_redirects: usize,

    /// User-Agent sent when the client supplies none.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            follow_redirects: true,
            max_redirects: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Desktop browser identity used for outbound requests.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Target host denylist.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Hosts rejected when equal to, or literally prefixed by, an entry.
    pub blocked_hosts: Vec<String>,

    /// Apply the denylist to every redirect hop as well.
    pub check_redirect_hops: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        let mut blocked_hosts: Vec<String> = ["localhost", "127.0.0.1", "::1", "0.0.0.0", "10.", "192.168."]
            .iter()
            .map(|s| s.to_string())
            .collect();
        blocked_hosts.extend((16..=31).map(|n| format!("172.{}.", n)));

        Self {
            blocked_hosts,
            check_redirect_hops: true,
        }
    }
}

/// Request header sanitization.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// Headers removed before forwarding (case-insensitive).
    pub strip_request: Vec<String>,

    /// User-Agent substrings that identify the proxy platform itself.
    pub platform_user_agents: Vec<String>,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            strip_request: [
                "cf-connecting-ip",
                "cf-connecting-ipv6",
                "cf-ipcountry",
                "cf-ray",
                "cf-visitor",
                "cf-worker",
                "cf-ew-via",
                "cdn-loop",
                "x-forwarded-for",
                "x-forwarded-proto",
                "x-forwarded-host",
                "x-forwarded-port",
                "x-real-ip",
                "true-client-ip",
                "forwarded",
                "via",
                "x-request-id",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            platform_user_agents: vec![
                "Cloudflare-Workers".to_string(),
                "edge-forward-proxy".to_string(),
            ],
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the in-memory response cache.
    pub enabled: bool,

    /// Entry lifetime in seconds.
    pub ttl_secs: u64,

    /// Maximum number of cached responses.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 300,
            max_entries: 1024,
        }
    }
}

/// Static site collaborators.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Directory served for `/download/*` and unmatched paths.
    pub assets_dir: Option<String>,

    /// Serve the file-list page at `/`.
    pub enable_index: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            assets_dir: None,
            enable_index: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
