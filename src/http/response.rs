//! Response header transformation.
//!
//! # Responsibilities
//! - Attach the permissive CORS set to every response
//! - Strip security headers that block embedding under the proxy origin
//! - Strip hop-by-hop headers received from the upstream
//! - Rewrite `Location` on redirects so navigation stays on the proxy
//! - Classify the body for the rewrite dispatch
//!
//! # Design Decisions
//! - Every transform takes a `HeaderMap` by value and returns a new one;
//!   the upstream's header set is never shared with the outbound response
//! - A `Location` that cannot be resolved is left as the upstream sent it

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use encoding_rs::Encoding;
use url::Url;

use crate::proxy::target::RewriteContext;
use crate::security::headers::is_hop_by_hop;

pub const X_PROXY_SERVER: &str = "x-proxy-server";
pub const X_PROXIED_URL: &str = "x-proxied-url";
pub const X_PROXY_CACHE: &str = "x-proxy-cache";

/// Response headers that would block the proxied page from working.
const SECURITY_HEADERS: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
    "x-frame-options",
    "x-content-type-options",
    "strict-transport-security",
    "x-xss-protection",
];

/// How the body of an upstream response is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    Other,
}

impl ContentKind {
    /// Classify from a `Content-Type` value (parameters ignored).
    pub fn from_content_type(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return ContentKind::Other;
        };
        let essence = value.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case("text/html")
            || essence.eq_ignore_ascii_case("application/xhtml+xml")
        {
            ContentKind::Html
        } else if essence.eq_ignore_ascii_case("text/css") {
            ContentKind::Css
        } else {
            ContentKind::Other
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::from_content_type(
            headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        )
    }

    /// Metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::Css => "css",
            ContentKind::Other => "passthrough",
        }
    }

    pub fn is_rewritable(&self) -> bool {
        !matches!(self, ContentKind::Other)
    }
}

/// Encoding named by the `charset` parameter of `Content-Type`, if any.
pub fn declared_charset(headers: &HeaderMap) -> Option<&'static Encoding> {
    let value = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    value
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, label)| Encoding::for_label(label.trim().trim_matches('"').as_bytes()))
}

/// Add the CORS set. Existing values are overwritten.
pub fn with_cors(mut headers: HeaderMap, allow_patch: bool) -> HeaderMap {
    let methods = if allow_patch {
        "GET, POST, PUT, DELETE, OPTIONS, HEAD, PATCH"
    } else {
        "GET, POST, PUT, DELETE, OPTIONS, HEAD"
    };
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(methods),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers
}

/// Drop response security headers.
pub fn strip_security_headers(mut headers: HeaderMap) -> HeaderMap {
    for name in SECURITY_HEADERS {
        headers.remove(*name);
    }
    headers
}

/// Drop hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    let hop: Vec<HeaderName> = headers.keys().filter(|n| is_hop_by_hop(n)).cloned().collect();
    for name in hop {
        headers.remove(name);
    }
    headers
}

pub fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Point a redirect's `Location` back through the proxy.
///
/// Absolute targets are proxied whatever their origin; relative ones are
/// resolved against the request URL first.
pub fn rewrite_location(mut headers: HeaderMap, status: StatusCode, ctx: &RewriteContext) -> HeaderMap {
    if !is_redirect(status) {
        return headers;
    }
    let Some(location) = headers.get(header::LOCATION).and_then(|v| v.to_str().ok()) else {
        return headers;
    };

    let resolved = if location.starts_with("//") {
        Url::parse(&format!("{}:{}", ctx.target_scheme(), location))
    } else {
        ctx.base_url().join(location)
    };

    match resolved {
        Ok(absolute) if matches!(absolute.scheme(), "http" | "https") => {
            let proxied = ctx.proxied(&absolute);
            match HeaderValue::from_str(&proxied) {
                Ok(value) => {
                    headers.insert(header::LOCATION, value);
                }
                Err(e) => {
                    tracing::debug!(error = %e, location = %proxied, "Unrepresentable Location");
                }
            }
        }
        Ok(_) => {}
        Err(e) => {
            tracing::debug!(error = %e, location = %location, "Leaving Location unchanged");
        }
    }
    headers
}

/// Echo which upstream served the response.
pub fn with_diagnostics(mut headers: HeaderMap, target: &Url) -> HeaderMap {
    headers.insert(
        HeaderName::from_static(X_PROXY_SERVER),
        HeaderValue::from_static(concat!("edge-forward-proxy/", env!("CARGO_PKG_VERSION"))),
    );
    if let Ok(value) = HeaderValue::from_str(target.as_str()) {
        headers.insert(HeaderName::from_static(X_PROXIED_URL), value);
    }
    headers
}
