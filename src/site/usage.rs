//! Usage page shown when `/proxy/` carries no target.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};

use super::escape_html;
use crate::http::response::with_cors;

pub fn usage_page(proxy_origin: &str, prefix: &str) -> Response {
    let base = escape_html(&format!("{}{}", proxy_origin.trim_end_matches('/'), prefix));
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Edge Forward Proxy</title>
  <style>
    body {{ font-family: sans-serif; max-width: 800px; margin: 40px auto; padding: 0 20px; color: #333; }}
    code {{ background: #f5f5f5; padding: 2px 6px; border-radius: 3px; }}
    li {{ margin: 8px 0; }}
  </style>
</head>
<body>
  <h1>Edge Forward Proxy</h1>
  <p>Append the address to fetch after the proxy prefix.</p>
  <ul>
    <li>Full URL: <code>{base}https://example.com/path?query</code></li>
    <li>Host only (https is assumed): <code>{base}example.com/path</code></li>
  </ul>
  <p>Any method and request body are forwarded. Links in HTML and CSS responses
  are rewritten to stay on this proxy; other content passes through unchanged.</p>
  <p>Private and loopback addresses are refused.</p>
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
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    let cors = with_cors(std::mem::take(headers), true);
    *response.headers_mut() = cors;
    response
}
