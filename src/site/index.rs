//! File-list index page.

use std::path::Path;

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};

use super::escape_html;

/// Render `/`. Lists the top-level entries of `assets_dir` when readable and
/// links to the proxy usage page under `prefix`.
pub async fn index_page(assets_dir: Option<&Path>, prefix: &str) -> Response {
    let prefix = escape_html(prefix);
    let entries = match assets_dir {
        Some(dir) => list_entries(dir).await,
        None => Vec::new(),
    };

    let items = if entries.is_empty() {
        "    <p>No files are published.</p>\n".to_string()
    } else {
        let mut items = String::from("    <ul>\n");
        for (name, is_dir) in &entries {
            let href = encode_segment(name);
            let label = escape_html(name);
            if *is_dir {
                items.push_str(&format!("      <li><a href=\"/{href}/\">{label}/</a></li>\n"));
            } else {
                items.push_str(&format!(
                    "      <li><a href=\"/{href}\">{label}</a> <a class=\"dl\" href=\"/download/{href}\">download</a></li>\n"
                ));
            }
        }
        items.push_str("    </ul>\n");
        items
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Files</title>
  <style>
    body {{ font-family: sans-serif; max-width: 800px; margin: 40px auto; padding: 0 20px; }}
    li {{ margin: 6px 0; }}
    .dl {{ margin-left: 12px; font-size: 0.9em; }}
  </style>
</head>
<body>
  <h1>Files</h1>
  <div class="directory">
{items}  </div>
  <p>Proxy usage: <a href="{prefix}">{prefix}</a></p>
</body>
</html>
"#
    );

    let mut response = Response::new(Body::from(html));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
    response
}

/// Sorted `(name, is_dir)` pairs, hidden entries skipped.
async fn list_entries(dir: &Path) -> Vec<(String, bool)> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) => {
            tracing::warn!(dir = ?dir, error = %e, "Cannot list assets directory");
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    loop {
        match read_dir.next_entry().await {
            Ok(Some(entry)) => {
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                if name.starts_with('.') {
                    continue;
                }
                let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                entries.push((name, is_dir));
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = ?dir, error = %e, "Error while listing assets directory");
                break;
            }
        }
    }
    entries.sort();
    entries
}

/// Percent-encode one path segment.
fn encode_segment(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}
