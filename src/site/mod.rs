//! Site pages served next to the proxy.
//!
//! # Routes
//! - `/proxy/` with no target → usage page
//! - `/` → index page listing the assets directory
//! - `/download/<path>` → asset as an attachment
//! - `/healthz` → liveness JSON
//! - anything else → static assets (`ServeDir`) when configured

pub mod download;
pub mod index;
pub mod usage;

use std::path::PathBuf;

use axum::Json;
use serde::Serialize;

use crate::config::SiteConfig;

pub use download::download;
pub use index::index_page;
pub use usage::usage_page;

/// Site settings fixed at router build time.
#[derive(Debug, Clone, Default)]
pub struct SiteSettings {
    pub assets_dir: Option<PathBuf>,
    pub enable_index: bool,
}

impl SiteSettings {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            assets_dir: config.assets_dir.as_ref().map(PathBuf::from),
            enable_index: config.enable_index,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn healthz() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Escape text for inclusion in HTML content or a quoted attribute.
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
