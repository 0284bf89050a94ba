//! Proxy request pipeline.
//!
//! # Data Flow
//! ```text
//! path remainder + query
//!     → resolve_target        (ProxySpec; foreign schemes are 400)
//!     → TargetFilter::check   (403 / 400 before any network call)
//!     → cache lookup          (GET without credentials only)
//!     → sanitize headers      (fresh HeaderMap)
//!     → UpstreamFetcher       (single attempt, bounded by timeouts)
//!     → RewriteContext        (from the final URL after redirects)
//!     → transform             (dispatch on Content-Type)
//!     → client                (+ fire-and-forget cache put)
//! ```
//!
//! # Design Decisions
//! - Stages run strictly in sequence; any of them can short-circuit
//! - HTML and CSS are buffered up to `max_rewrite_bytes`; everything else
//!   streams through untouched
//! - Bodies are rewritten in the charset their `Content-Type` declares; one
//!   that cannot be rewritten (UTF-16, parser failure) is passed through

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    response::Response,
};
use bytes::{Bytes, BytesMut};

use crate::cache::{
    is_cacheable_request, is_storable_response, CacheKey, CachedResponse, MemoryCache, NoopCache,
    ResponseCache,
};
use crate::config::{ProxyConfig, ProxySettings};
use crate::error::ProxyError;
use crate::http::response::{
    declared_charset, rewrite_location, strip_hop_by_hop, strip_security_headers, with_cors,
    with_diagnostics, ContentKind, X_PROXY_CACHE,
};
use crate::observability::metrics;
use crate::proxy::fetch::UpstreamFetcher;
use crate::proxy::target::{resolve_target, ProxySpec, RewriteContext};
use crate::rewrite::{rewrite_css_bytes, rewrite_html_bytes, RewriteError};
use crate::security::{sanitize_request_headers, HeaderPolicy, TargetFilter};

/// Everything one request needs, built once per config generation.
pub struct ProxyPipeline {
    settings: ProxySettings,
    filter: TargetFilter,
    headers: HeaderPolicy,
    fetcher: UpstreamFetcher,
    cache: Arc<dyn ResponseCache>,
    cache_enabled: bool,
}

impl ProxyPipeline {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let (cache, cache_enabled): (Arc<dyn ResponseCache>, bool) = if config.cache.enabled {
            (Arc::new(MemoryCache::from_config(&config.cache)), true)
        } else {
            (Arc::new(NoopCache), false)
        };

        Ok(Self {
            settings: config.proxy.clone(),
            filter: TargetFilter::from_config(&config.safety),
            headers: HeaderPolicy::from_config(&config.headers, &config.upstream),
            fetcher: UpstreamFetcher::new(&config.upstream, &config.safety)?,
            cache,
            cache_enabled,
        })
    }

    /// Replace the response cache.
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = cache;
        self.cache_enabled = true;
        self
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    /// Public origin of this proxy as seen by the client.
    pub fn proxy_origin(&self, headers: &HeaderMap) -> String {
        proxy_origin(&self.settings, headers)
    }

    /// Run one request through the pipeline.
    ///
    /// `remainder` is the raw path after the prefix. Returns
    /// `ProxyError::NoTarget` when it is empty.
    pub async fn handle(
        &self,
        request: Request<Body>,
        remainder: &str,
        proxy_origin: &str,
    ) -> Result<Response, ProxyError> {
        let spec = resolve_target(
            remainder,
            request.uri().query(),
            &self.settings.default_scheme,
        )
        .inspect_err(|e| {
            if let ProxyError::UnsupportedProtocol(scheme) = e {
                metrics::record_blocked("protocol");
                tracing::warn!(scheme = %scheme, "Rejected target");
            }
        })?;

        if let Err(e) = self.filter.check(&spec) {
            let reason = match &e {
                ProxyError::UnsupportedProtocol(_) => "protocol",
                _ => "denylist",
            };
            metrics::record_blocked(reason);
            tracing::warn!(url = %spec.url(), error = %e, "Rejected target");
            return Err(e);
        }

        let method = request.method().clone();

        let cache_key = (self.cache_enabled && is_cacheable_request(&method, request.headers()))
            .then(|| CacheKey::new(method.clone(), spec.url(), proxy_origin));
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key) {
                metrics::record_cache_event("hit");
                tracing::debug!(url = %spec.url(), "Serving from cache");
                return Ok(cached_response(hit, "HIT"));
            }
            metrics::record_cache_event("miss");
        }

        let (parts, body) = request.into_parts();
        let outbound = sanitize_request_headers(&parts.headers, &spec, &self.headers);
        let body = self.read_body(&parts.headers, body).await?;

        tracing::debug!(
            method = %method,
            url = %spec.url(),
            body_bytes = body.len(),
            "Forwarding request"
        );

        let upstream = self
            .fetcher
            .fetch(method.clone(), spec.url().clone(), outbound, body)
            .await?;

        // Relative references resolve against where the redirects ended.
        let spec = if upstream.url() == spec.url() {
            spec
        } else {
            tracing::debug!(from = %spec.url(), to = %upstream.url(), "Followed redirect");
            ProxySpec::from_url(upstream.url().clone())?
        };
        let ctx = RewriteContext::new(&spec, proxy_origin, &self.settings.prefix);

        self.transform(upstream, &method, &spec, &ctx, cache_key).await
    }

    async fn read_body(&self, headers: &HeaderMap, body: Body) -> Result<Bytes, ProxyError> {
        let limit = self.settings.max_request_body_bytes;
        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(ProxyError::RequestBodyTooLarge(limit));
        }

        axum::body::to_bytes(body, limit).await.map_err(|e| {
            tracing::debug!(error = %e, "Failed to read request body");
            ProxyError::RequestBodyTooLarge(limit)
        })
    }

    async fn transform(
        &self,
        mut upstream: reqwest::Response,
        method: &Method,
        spec: &ProxySpec,
        ctx: &RewriteContext,
        cache_key: Option<CacheKey>,
    ) -> Result<Response, ProxyError> {
        let status = upstream.status();
        let kind = ContentKind::from_headers(upstream.headers());
        let headers = self.transform_headers(upstream.headers().clone(), status, spec, ctx);

        let has_body = *method != Method::HEAD
            && status != StatusCode::NO_CONTENT
            && status != StatusCode::NOT_MODIFIED;
        let cap = self.settings.max_rewrite_bytes;
        let fits = upstream.content_length().map_or(true, |len| len as usize <= cap);

        if !(kind.is_rewritable() && has_body && fits) {
            if kind.is_rewritable() && has_body {
                tracing::debug!(url = %spec.url(), cap, "Body over rewrite cap, streaming");
            }
            metrics::record_rewrite(ContentKind::Other.as_str());
            let body = Body::from_stream(upstream.bytes_stream());
            return Ok(self.finish(status, headers, body, cache_key.is_some()));
        }

        let mut buffered = BytesMut::new();
        while let Some(chunk) = upstream
            .chunk()
            .await
            .map_err(|e| ProxyError::from_upstream(e, self.fetcher.timeout_secs()))?
        {
            if buffered.len() + chunk.len() > cap {
                tracing::warn!(url = %spec.url(), cap, "Rewritable body exceeded cap");
                return Err(ProxyError::ResponseTooLarge(cap));
            }
            buffered.extend_from_slice(&chunk);
        }
        let buffered = buffered.freeze();

        let mut headers = headers;
        let body = match rewrite_body(kind, &buffered, declared_charset(&headers), ctx) {
            Ok(rewritten) => {
                metrics::record_rewrite(kind.as_str());
                headers.remove(header::CONTENT_LENGTH);
                Bytes::from(rewritten)
            }
            Err(e) => {
                tracing::debug!(url = %spec.url(), error = %e, "Passing body through unrewritten");
                metrics::record_rewrite(ContentKind::Other.as_str());
                buffered
            }
        };

        if let Some(key) = cache_key.clone().filter(|_| is_storable_response(status, &headers)) {
            let cache = Arc::clone(&self.cache);
            let entry = CachedResponse {
                status,
                headers: headers.clone(),
                body: body.clone(),
            };
            tokio::spawn(async move {
                cache.put(key, entry);
            });
        }

        Ok(self.finish(status, headers, Body::from(body), cache_key.is_some()))
    }

    fn transform_headers(
        &self,
        headers: HeaderMap,
        status: StatusCode,
        spec: &ProxySpec,
        ctx: &RewriteContext,
    ) -> HeaderMap {
        let headers = strip_hop_by_hop(headers);
        let headers = strip_security_headers(headers);
        let headers = rewrite_location(headers, status, ctx);
        let headers = with_cors(headers, self.settings.allow_patch_method);
        if self.settings.add_diagnostic_headers {
            with_diagnostics(headers, spec.url())
        } else {
            headers
        }
    }

    fn finish(&self, status: StatusCode, headers: HeaderMap, body: Body, cache_miss: bool) -> Response {
        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        if cache_miss {
            response.headers_mut().insert(
                HeaderName::from_static(X_PROXY_CACHE),
                HeaderValue::from_static("MISS"),
            );
        }
        response
    }
}

fn rewrite_body(
    kind: ContentKind,
    body: &[u8],
    charset: Option<&'static encoding_rs::Encoding>,
    ctx: &RewriteContext,
) -> Result<Vec<u8>, RewriteError> {
    match kind {
        ContentKind::Html => rewrite_html_bytes(body, charset, ctx),
        _ => rewrite_css_bytes(body, charset, ctx),
    }
}

fn cached_response(hit: CachedResponse, marker: &'static str) -> Response {
    let mut response = Response::new(Body::from(hit.body));
    *response.status_mut() = hit.status;
    *response.headers_mut() = hit.headers;
    response.headers_mut().insert(
        HeaderName::from_static(X_PROXY_CACHE),
        HeaderValue::from_static(marker),
    );
    response
}

/// `public_origin` when configured, otherwise `public_scheme://<Host>`.
pub fn proxy_origin(settings: &ProxySettings, headers: &HeaderMap) -> String {
    if let Some(origin) = &settings.public_origin {
        return origin.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost");
    format!("{}://{}", settings.public_scheme, host)
}
