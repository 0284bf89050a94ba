//! Proxy error taxonomy and its mapping onto HTTP responses.
//!
//! # Design Decisions
//! - Target errors (invalid, forbidden, unsupported) are raised before any
//!   upstream contact and map to 4xx
//! - Everything past the resolver maps to 500 with a plain-text message
//! - Error responses carry the same CORS set as proxied responses
//! - Per-token rewrite failures never surface here (see `rewrite::RewriteError`)

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::http::response::with_cors;

/// Errors produced by the proxy request pipeline.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Nothing follows the proxy prefix; the caller renders the usage page.
    #[error("no target URL supplied")]
    NoTarget,

    /// The target could not be parsed into a URL.
    #[error("invalid target URL: {0}")]
    InvalidTarget(String),

    /// The target host is on the private/internal denylist.
    #[error("access to {0} is forbidden")]
    ForbiddenTarget(String),

    /// The resolved scheme is neither http nor https.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// The inbound request body exceeded the configured limit.
    #[error("request body exceeds {0} bytes")]
    RequestBodyTooLarge(usize),

    /// Network-level failure reaching the target.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(#[source] reqwest::Error),

    /// The upstream did not answer within the configured bound.
    #[error("upstream request timed out after {0} seconds")]
    UpstreamTimeout(u64),

    /// A rewritable body grew past the buffering cap.
    #[error("upstream response exceeds {0} bytes rewrite limit")]
    ResponseTooLarge(usize),

    /// Anything else.
    #[error("internal proxy error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status surfaced to the client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTarget(_) | ProxyError::UnsupportedProtocol(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::ForbiddenTarget(_) => StatusCode::FORBIDDEN,
            ProxyError::RequestBodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::NoTarget
            | ProxyError::UpstreamFetch(_)
            | ProxyError::UpstreamTimeout(_)
            | ProxyError::ResponseTooLarge(_)
            | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::NoTarget => "no_target",
            ProxyError::InvalidTarget(_) => "invalid_target",
            ProxyError::ForbiddenTarget(_) => "forbidden_target",
            ProxyError::UnsupportedProtocol(_) => "unsupported_protocol",
            ProxyError::RequestBodyTooLarge(_) => "request_too_large",
            ProxyError::UpstreamFetch(_) => "upstream_fetch",
            ProxyError::UpstreamTimeout(_) => "upstream_timeout",
            ProxyError::ResponseTooLarge(_) => "response_too_large",
            ProxyError::Internal(_) => "internal",
        }
    }

    /// Classify a client error, separating timeouts from other failures.
    pub fn from_upstream(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ProxyError::UpstreamTimeout(timeout_secs)
        } else {
            ProxyError::UpstreamFetch(err)
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Include the underlying cause chain for network failures.
            ProxyError::UpstreamFetch(e) => {
                let mut msg = self.to_string();
                let mut source = std::error::Error::source(e);
                while let Some(cause) = source {
                    msg.push_str(": ");
                    msg.push_str(&cause.to_string());
                    source = cause.source();
                }
                msg
            }
            _ => self.to_string(),
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        let headers = with_cors(headers, true);

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}
