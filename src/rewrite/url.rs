//! URL conversion.
//!
//! Maps a reference found in proxied content onto the proxy:
//!
//! ```text
//! data: javascript: mailto: tel: # ? ""   → unchanged
//! //host/path                              → <target scheme>://host/path
//! /path                                    → <target origin>/path
//! http(s)://...                            → as is
//! anything else                            → resolved against the request URL
//!
//! same origin as target   → proxy_base + path?query#fragment
//! different origin        → the absolute URL, not proxied
//! ```
//!
//! A root-relative reference that already carries the proxy prefix
//! (`/proxy/https://...`) resolves against the target origin and is
//! wrapped a second time. Fully-qualified proxy URLs are a different origin
//! and stay untouched.

use url::Url;

use super::RewriteError;
use crate::proxy::target::{origin_of, RewriteContext};

const PASSTHROUGH_SCHEMES: &[&str] = &["data:", "javascript:", "mailto:", "tel:"];

/// Convert one reference. Never fails: on any error the input is returned.
pub fn convert_url(raw: &str, ctx: &RewriteContext) -> String {
    match try_convert_url(raw, ctx) {
        Ok(Some(converted)) => converted,
        Ok(None) => raw.to_string(),
        Err(e) => {
            tracing::trace!(error = %e, "Leaving reference unchanged");
            raw.to_string()
        }
    }
}

/// `Ok(None)` means the reference passes through verbatim.
pub fn try_convert_url(raw: &str, ctx: &RewriteContext) -> Result<Option<String>, RewriteError> {
    let trimmed = raw.trim();
    if is_passthrough(trimmed) {
        return Ok(None);
    }

    let absolute = resolve(trimmed, ctx)?;
    if origin_of(&absolute) == ctx.target_origin {
        Ok(Some(ctx.rebase(&absolute)))
    } else if is_absolute_http(trimmed) {
        Ok(None)
    } else {
        Ok(Some(absolute.to_string()))
    }
}

/// Resolve a raw reference to an absolute URL without proxying it.
pub fn resolve(trimmed: &str, ctx: &RewriteContext) -> Result<Url, RewriteError> {
    let parsed = if trimmed.starts_with("//") {
        Url::parse(&format!("{}:{}", ctx.target_scheme(), trimmed))
    } else if trimmed.starts_with('/') {
        Url::parse(&format!("{}{}", ctx.target_origin, trimmed))
    } else if is_absolute_http(trimmed) {
        Url::parse(trimmed)
    } else {
        ctx.base_url().join(trimmed)
    };
    parsed.map_err(|source| RewriteError::Url {
        reference: trimmed.to_string(),
        source,
    })
}

fn is_passthrough(trimmed: &str) -> bool {
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('?') {
        return true;
    }
    PASSTHROUGH_SCHEMES.iter().any(|scheme| starts_with_ignore_case(trimmed, scheme))
}

fn is_absolute_http(trimmed: &str) -> bool {
    starts_with_ignore_case(trimmed, "http://") || starts_with_ignore_case(trimmed, "https://")
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
