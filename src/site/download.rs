//! `/download/<path>`: serve an asset as an attachment.

use std::path::{Component, Path};

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;

pub async fn download(assets_dir: Option<&Path>, relative: &str, request: Request<Body>) -> Response {
    let Some(dir) = assets_dir else {
        return not_found();
    };
    if !is_safe_relative(relative) {
        tracing::debug!(path = %relative, "Rejected download path");
        return not_found();
    }

    let full = dir.join(relative);
    match tokio::fs::metadata(&full).await {
        Ok(meta) if meta.is_file() => {}
        _ => return not_found(),
    }

    let response = match ServeFile::new(&full).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };

    let (mut parts, body) = response.into_parts();
    let file_name = relative.rsplit('/').next().unwrap_or(relative).replace(['"', '\\'], "_");
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name)) {
        parts.headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Response::from_parts(parts, body)
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "file not found").into_response()
}

/// Only plain, non-empty, relative segments.
fn is_safe_relative(relative: &str) -> bool {
    !relative.is_empty()
        && !relative.contains('\\')
        && Path::new(relative)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}
