//! Target resolution.
//!
//! # Responsibilities
//! - Turn the path remainder after the proxy prefix into a target URL
//! - Default the scheme when the remainder names only a host
//! - Merge the inbound query string into the target's own query
//! - Derive the per-request `RewriteContext`
//!
//! # Design Decisions
//! - Query merge is a raw string append: duplicate keys, order and the
//!   client's original encoding all survive
//! - `https:/host` (a single slash, as produced by path-normalizing
//!   intermediaries) is repaired to `https://host`
//! - Host values go through WHATWG URL parsing, so numeric hosts are
//!   normalized (e.g. `0x7f.1` becomes `127.0.0.1`) before any filter sees them

use url::{Position, Url};

use crate::error::ProxyError;

/// Fully resolved target location for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySpec {
    /// `http` or `https`.
    pub scheme: String,
    /// Host as parsed from the target URL (IPv6 literals keep their brackets).
    pub host: String,
    /// Explicit non-default port, if any.
    pub port: Option<u16>,
    /// Path component, always starting with `/`.
    pub path: String,
    /// Merged query string without the leading `?`.
    pub query: Option<String>,
    url: Url,
}

impl ProxySpec {
    /// Build a spec from an already-parsed URL.
    pub fn from_url(url: Url) -> Result<Self, ProxyError> {
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProxyError::InvalidTarget(url.to_string()))?
            .to_string();

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port: url.port(),
            path: url.path().to_string(),
            query: url.query().map(str::to_string),
            url,
        })
    }

    /// The complete target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `scheme://host[:port]`.
    pub fn origin(&self) -> String {
        origin_of(&self.url)
    }

    /// Value for the outbound `Host` header.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

/// `scheme://host[:port]` of a URL, omitting default ports.
pub fn origin_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

/// Per-request context all rewritten URLs are computed from.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    /// `scheme://host[:port]` of the target.
    pub target_origin: String,
    /// `proxy_origin + prefix + target_origin`.
    pub proxy_base: String,
    /// Public origin of this proxy.
    pub proxy_origin: String,
    /// Path prefix, e.g. `/proxy/`.
    pub prefix: String,
    target_scheme: String,
    base_url: Url,
}

impl RewriteContext {
    pub fn new(spec: &ProxySpec, proxy_origin: &str, prefix: &str) -> Self {
        let proxy_origin = proxy_origin.trim_end_matches('/').to_string();
        let target_origin = spec.origin();
        Self {
            proxy_base: format!("{}{}{}", proxy_origin, prefix, target_origin),
            target_origin,
            proxy_origin,
            prefix: prefix.to_string(),
            target_scheme: spec.scheme.clone(),
            base_url: spec.url().clone(),
        }
    }

    /// Scheme of the target, used for protocol-relative references.
    pub fn target_scheme(&self) -> &str {
        &self.target_scheme
    }

    /// URL relative references resolve against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Route any absolute URL through the proxy, regardless of origin.
    pub fn proxied(&self, absolute: &Url) -> String {
        format!("{}{}{}", self.proxy_origin, self.prefix, absolute)
    }

    /// Replace the origin portion of a same-origin URL with `proxy_base`.
    pub fn rebase(&self, same_origin: &Url) -> String {
        format!("{}{}", self.proxy_base, &same_origin[Position::BeforePath..])
    }
}

/// Resolve the proxy path remainder and inbound query into a `ProxySpec`.
///
/// `remainder` is everything after the prefix; `query` is the inbound query
/// string without `?`. A leading scheme other than `http`/`https` is rejected
/// before any network activity.
pub fn resolve_target(
    remainder: &str,
    query: Option<&str>,
    default_scheme: &str,
) -> Result<ProxySpec, ProxyError> {
    let remainder = remainder.trim_start_matches('/');
    if remainder.is_empty() {
        return Err(ProxyError::NoTarget);
    }

    let candidate = match split_scheme(remainder) {
        Some((scheme, rest)) => format!("{}://{}", scheme, rest.trim_start_matches('/')),
        None => {
            if let Some(scheme) = foreign_scheme(remainder) {
                return Err(ProxyError::UnsupportedProtocol(scheme.to_ascii_lowercase()));
            }
            format!("{}://{}", default_scheme, remainder)
        }
    };

    let mut url = Url::parse(&candidate)
        .map_err(|e| ProxyError::InvalidTarget(format!("{} ({})", candidate, e)))?;

    if let Some(inbound) = query.filter(|q| !q.is_empty()) {
        let merged = match url.query().filter(|q| !q.is_empty()) {
            Some(own) => format!("{}&{}", own, inbound),
            None => inbound.to_string(),
        };
        url.set_query(Some(&merged));
    }

    ProxySpec::from_url(url)
}

/// Recognize a leading `http:` / `https:` (case-insensitive) followed by at
/// least one slash.
fn split_scheme(remainder: &str) -> Option<(&'static str, &str)> {
    for scheme in ["https", "http"] {
        let len = scheme.len();
        let Some(head) = remainder.get(..len) else {
            continue;
        };
        if head.eq_ignore_ascii_case(scheme) && remainder[len..].starts_with(":/") {
            return Some((scheme, &remainder[len + 1..]));
        }
    }
    None
}

/// A leading `scheme:` that cannot be a host. Host names carry dots and ports
/// start with a digit, so `example.com:8080/x` and `localhost:3000` fall
/// through to the default scheme.
fn foreign_scheme(remainder: &str) -> Option<&str> {
    let (scheme, rest) = remainder.split_once(':')?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-');
    let port_like = rest.is_empty() || rest.starts_with(|c: char| c.is_ascii_digit());
    (valid && !port_like).then_some(scheme)
}
