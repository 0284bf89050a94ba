//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the proxy and site handlers
//! - Wire up middleware (timeout, request ID, tracing)
//! - Hot-swap the proxy runtime when a new config arrives
//! - Serve until the shutdown signal fires
//!
//! # Design Decisions
//! - The proxy prefix and site settings are bound when the router is built;
//!   changing them needs a restart
//! - Everything else (client, filter, header policy, cache) lives in
//!   `ProxyRuntime` and is swapped atomically with `ArcSwap`

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::request::{request_id_middleware, RequestIdExt};
use crate::observability::metrics;
use crate::proxy::ProxyPipeline;
use crate::site::{self, SiteSettings};

/// Config-derived state that can be replaced at runtime.
pub struct ProxyRuntime {
    pub config: ProxyConfig,
    pub pipeline: ProxyPipeline,
}

impl ProxyRuntime {
    pub fn from_config(config: ProxyConfig) -> Result<Self, ProxyError> {
        let pipeline = ProxyPipeline::from_config(&config)?;
        Ok(Self { config, pipeline })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<ProxyRuntime>>,
    pub site: Arc<SiteSettings>,
    pub prefix: Arc<str>,
}

/// HTTP server for the forward proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let runtime = ProxyRuntime::from_config(config)?;
        Ok(Self::with_runtime(runtime))
    }

    /// Create a server around a prepared runtime.
    pub fn with_runtime(runtime: ProxyRuntime) -> Self {
        let state = AppState {
            site: Arc::new(SiteSettings::from_config(&runtime.config.site)),
            prefix: Arc::from(runtime.config.proxy.prefix.as_str()),
            inner: Arc::new(ArcSwap::from_pointee(runtime)),
        };
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let prefix = state.prefix.to_string();
        let bare_prefix = prefix.trim_end_matches('/').to_string();
        // Leave headroom so the upstream timeout reports first.
        let upstream_secs = state.inner.load().config.upstream.request_timeout_secs;
        let timeout = Duration::from_secs(upstream_secs + 5);

        let mut router = Router::new()
            .route("/healthz", get(site::healthz))
            .route("/download/{*path}", get(download_handler))
            .route(&bare_prefix, any(proxy_handler))
            .route(&prefix, any(proxy_handler))
            .route(&format!("{}{{*rest}}", prefix), any(proxy_handler));

        if state.site.enable_index {
            router = router.route("/", get(index_handler));
        }

        router = match &state.site.assets_dir {
            Some(dir) => router.fallback_service(ServeDir::new(dir)),
            None => router.fallback(not_found),
        };

        router
            .with_state(state)
            .layer(TimeoutLayer::new(timeout))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, prefix = %self.state.prefix, "HTTP server starting");

        let inner = self.state.inner.clone();
        let reload = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                apply_config(&inner, new_config);
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        reload.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Shared state, for inspection.
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Swap in a new runtime; the previous one stays in use on failure.
pub fn apply_config(inner: &ArcSwap<ProxyRuntime>, mut new_config: ProxyConfig) {
    let current = inner.load();
    if current.config.proxy.prefix != new_config.proxy.prefix
        || current.config.listener.bind_address != new_config.listener.bind_address
        || current.config.site.assets_dir != new_config.site.assets_dir
        || current.config.site.enable_index != new_config.site.enable_index
    {
        tracing::warn!("Listener, prefix and site settings take effect after a restart");
    }
    // The router is bound to the current prefix.
    new_config.proxy.prefix = current.config.proxy.prefix.clone();
    drop(current);

    match ProxyRuntime::from_config(new_config) {
        Ok(runtime) => {
            inner.store(Arc::new(runtime));
            tracing::info!("Configuration reloaded");
        }
        Err(e) => {
            tracing::error!(error = %e, "Rejected reloaded configuration");
        }
    }
}

/// Entry point for everything under the proxy prefix.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let runtime = state.inner.load_full();
    let method = request.method().clone();
    let request_id = request
        .request_id()
        .map(|id| id.to_string())
        .unwrap_or_default();
    let remainder = request
        .uri()
        .path()
        .strip_prefix(&*state.prefix)
        .unwrap_or_default()
        .to_string();
    let proxy_origin = runtime.pipeline.proxy_origin(request.headers());

    let response = match runtime.pipeline.handle(request, &remainder, &proxy_origin).await {
        Ok(response) => response,
        Err(ProxyError::NoTarget) => site::usage_page(&proxy_origin, &state.prefix),
        Err(e) => {
            tracing::debug!(request_id = %request_id, kind = e.kind(), error = %e, "Proxy request failed");
            e.into_response()
        }
    };

    let status = response.status().as_u16();
    metrics::record_request(method.as_str(), status, start);
    tracing::info!(
        request_id = %request_id,
        method = %method,
        url = %remainder,
        status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Proxy request completed"
    );
    response
}

async fn index_handler(State(state): State<AppState>) -> Response {
    site::index_page(state.site.assets_dir.as_deref(), &state.prefix).await
}

async fn download_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request<Body>,
) -> Response {
    site::download(state.site.assets_dir.as_deref(), &path, request).await
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}
