//! Outbound request header sanitization.
//!
//! # Responsibilities
//! - Drop headers that identify the proxy or the client's address
//! - Drop hop-by-hop headers and those the client recomputes
//! - Point `Host`, `Referer` and `Origin` at the target
//! - Supply a desktop browser `User-Agent` when needed
//!
//! # Design Decisions
//! - Pure function: the inbound map is borrowed, a fresh map is returned
//! - `Accept-Encoding` is not forwarded; the upstream client negotiates
//!   and decodes compression itself so rewriting always sees plain text

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::config::{HeaderConfig, UpstreamConfig};
use crate::proxy::target::ProxySpec;

/// Static header policy derived from configuration.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    strip: Vec<HeaderName>,
    platform_user_agents: Vec<String>,
    user_agent: HeaderValue,
}

impl HeaderPolicy {
    pub fn from_config(headers: &HeaderConfig, upstream: &UpstreamConfig) -> Self {
        let strip = headers
            .strip_request
            .iter()
            .filter_map(|name| match HeaderName::from_bytes(name.trim().as_bytes()) {
                Ok(name) => Some(name),
                Err(_) => {
                    tracing::warn!(header = %name, "Ignoring invalid header name in strip list");
                    None
                }
            })
            .collect();

        let user_agent = HeaderValue::from_str(&upstream.user_agent).unwrap_or_else(|_| {
            tracing::warn!("Configured user agent is not a valid header value, using default");
            HeaderValue::from_static(crate::config::schema::DEFAULT_USER_AGENT)
        });

        Self {
            strip,
            platform_user_agents: headers.platform_user_agents.clone(),
            user_agent,
        }
    }

    fn is_platform_agent(&self, value: &HeaderValue) -> bool {
        let Ok(value) = value.to_str() else {
            return false;
        };
        self.platform_user_agents
            .iter()
            .any(|marker| value.contains(marker.as_str()))
    }
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self::from_config(&HeaderConfig::default(), &UpstreamConfig::default())
    }
}

/// Build the outbound header set for a target.
pub fn sanitize_request_headers(
    inbound: &HeaderMap,
    target: &ProxySpec,
    policy: &HeaderPolicy,
) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.len());

    for (name, value) in inbound.iter() {
        if policy.strip.contains(name)
            || is_hop_by_hop(name)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || name == header::ACCEPT_ENCODING
        {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }

    // Tokens listed in Connection are hop-by-hop as well.
    for token in inbound
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
    {
        if let Ok(name) = HeaderName::from_bytes(token.trim().as_bytes()) {
            outbound.remove(name);
        }
    }

    let origin = target.origin();
    if let Ok(host) = HeaderValue::from_str(&target.authority()) {
        outbound.insert(header::HOST, host);
    }
    if let Ok(referer) = HeaderValue::from_str(&origin) {
        if outbound.contains_key(header::ORIGIN) {
            outbound.insert(header::ORIGIN, referer.clone());
        }
        outbound.insert(header::REFERER, referer);
    }

    let needs_agent = match outbound.get(header::USER_AGENT) {
        None => true,
        Some(agent) => policy.is_platform_agent(agent),
    };
    if needs_agent {
        outbound.insert(header::USER_AGENT, policy.user_agent.clone());
    }

    outbound
}

/// Connection-scoped headers never forwarded in either direction.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}
