//! Upstream fetcher.
//!
//! # Responsibilities
//! - Own the shared outbound HTTP client
//! - Bound every request with connect and overall timeouts
//! - Follow redirects, re-checking each hop against the target filter
//!
//! # Design Decisions
//! - No retries: a failed fetch is surfaced to the client as is
//! - A redirect hop to a blocked host stops the chain; the 3xx itself is
//!   returned and its `Location` rewritten like any other redirect
//! - Cancellation is structural: the request future is dropped with the
//!   inbound request, which releases the upstream connection

use std::time::{Duration, Instant};

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use reqwest::redirect::Policy;
use url::Url;

use crate::config::{SafetyConfig, UpstreamConfig};
use crate::error::ProxyError;
use crate::security::TargetFilter;

/// Outbound client shared by all requests of one runtime generation.
#[derive(Debug, Clone)]
pub struct UpstreamFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl UpstreamFetcher {
    pub fn new(upstream: &UpstreamConfig, safety: &SafetyConfig) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(upstream.connect_timeout_secs))
            .timeout(Duration::from_secs(upstream.request_timeout_secs))
            .redirect(redirect_policy(upstream, safety))
            .no_proxy()
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to build upstream client: {}", e)))?;

        Ok(Self {
            client,
            timeout_secs: upstream.request_timeout_secs,
        })
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Issue one upstream request.
    pub async fn fetch(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        let start = Instant::now();
        let mut request = self.client.request(method.clone(), url.clone()).headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }

        match request.send().await {
            Ok(response) => {
                tracing::debug!(
                    method = %method,
                    url = %url,
                    final_url = %response.url(),
                    status = response.status().as_u16(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Upstream responded"
                );
                Ok(response)
            }
            Err(e) => {
                tracing::error!(
                    method = %method,
                    url = %url,
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Upstream fetch failed"
                );
                Err(ProxyError::from_upstream(e, self.timeout_secs))
            }
        }
    }
}

fn redirect_policy(upstream: &UpstreamConfig, safety: &SafetyConfig) -> Policy {
    if !upstream.follow_redirects {
        return Policy::none();
    }
    if !safety.check_redirect_hops {
        return Policy::limited(upstream.max_redirects);
    }

    let filter = TargetFilter::from_config(safety);
    let max = upstream.max_redirects;
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max {
            return attempt.error(format!("too many redirects (max {})", max));
        }
        match filter.check_url(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(e) => {
                crate::observability::metrics::record_blocked("redirect");
                tracing::warn!(hop = %attempt.url(), error = %e, "Stopping redirect chain");
                attempt.stop()
            }
        }
    })
}
