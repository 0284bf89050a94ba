//! Response cache.
//!
//! # Data Flow
//! ```text
//! pipeline (GET) → ResponseCache::get → HIT: serve stored response
//!                                     → MISS: fetch, transform
//!                                        → tokio::spawn(ResponseCache::put)
//! ```
//!
//! # Design Decisions
//! - The pipeline only sees the `ResponseCache` trait; `NoopCache` stands in
//!   when caching is disabled
//! - Writes happen on a spawned task and never gate the response
//! - Only successful, fully buffered (rewritten) responses are stored
//! - Requests carrying credentials bypass the cache in both directions, and
//!   responses that set cookies or are marked private are never stored

pub mod memory;

use axum::http::{header, HeaderMap, Method, StatusCode};
use bytes::Bytes;

pub use memory::MemoryCache;

/// Normalized request identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    /// Fully resolved target URL, query included.
    pub url: String,
    /// Rewritten bodies embed the proxy origin, so it is part of the key.
    pub proxy_origin: String,
}

impl CacheKey {
    pub fn new(method: Method, url: &url::Url, proxy_origin: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            proxy_origin: proxy_origin.to_string(),
        }
    }
}

/// Whether a request may be answered from, or populate, the shared cache.
pub fn is_cacheable_request(method: &Method, headers: &HeaderMap) -> bool {
    *method == Method::GET
        && !headers.contains_key(header::COOKIE)
        && !headers.contains_key(header::AUTHORIZATION)
}

/// Whether a successful response may be stored for other clients.
pub fn is_storable_response(status: StatusCode, headers: &HeaderMap) -> bool {
    if !status.is_success() || headers.contains_key(header::SET_COOKIE) {
        return false;
    }
    !headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|directive| {
            let directive = directive.trim();
            directive.eq_ignore_ascii_case("private") || directive.eq_ignore_ascii_case("no-store")
        })
}

/// A transformed response ready to be replayed.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Injected cache interface.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CachedResponse>;
    fn put(&self, key: CacheKey, response: CachedResponse);
}

/// Cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl ResponseCache for NoopCache {
    fn get(&self, _key: &CacheKey) -> Option<CachedResponse> {
        None
    }

    fn put(&self, _key: CacheKey, _response: CachedResponse) {}
}
