//! Edge forward proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ http::server ──▶ proxy::pipeline ──────────────────────▶ Target
//!              (router,          resolve → filter → sanitize → fetch      origin
//!               request id,                                    │
//!               timeout)                                       ▼
//!   Client ◀── http::response ◀── rewrite (html / css / script) ◀── body
//!              (CORS, Location,
//!               security headers)
//!
//!   Cross-cutting: config (TOML + hot reload), cache, site pages,
//!                  observability (tracing, Prometheus), lifecycle
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_forward_proxy::config::loader::load_config;
use edge_forward_proxy::config::watcher::ConfigWatcher;
use edge_forward_proxy::config::ProxyConfig;
use edge_forward_proxy::lifecycle::{wait_for_signal, Shutdown};
use edge_forward_proxy::observability::{init_logging, init_metrics};
use edge_forward_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "edge-forward-proxy")]
#[command(about = "Forward proxy that rewrites pages to stay on the proxy", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-forward-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        prefix = %config.proxy.prefix,
        request_timeout_secs = config.upstream.request_timeout_secs,
        cache_enabled = config.cache.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // Hot reload. The watcher must outlive the server.
    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (updates, Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watching disabled");
                    (updates, None)
                }
            }
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(config)?;

    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
