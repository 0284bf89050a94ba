//! End-to-end tests: real server, mock upstream, reqwest client.

use std::time::Duration;

use edge_forward_proxy::config::ProxyConfig;

mod common;
use common::{client, start_mock_upstream, start_proxy, test_config, MockResponse};

#[tokio::test]
async fn test_html_links_are_rewritten() {
    let upstream = start_mock_upstream(|_| {
        MockResponse::new(200, r#"<html><body><a href="/about">About</a><img src="https://cdn.example.net/x.png"></body></html>"#)
            .header("Content-Type", "text/html; charset=utf-8")
            .header("Content-Security-Policy", "default-src 'self'")
            .header("X-Frame-Options", "DENY")
    })
    .await;
    let proxy = start_proxy(test_config()).await;

    let target = format!("{}/", upstream.origin());
    let res = client().get(proxy.proxied(&target)).send().await.unwrap();
    assert_eq!(res.status(), 200);

    let headers = res.headers().clone();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-expose-headers"], "*");
    assert!(!headers.contains_key("content-security-policy"));
    assert!(!headers.contains_key("x-frame-options"));
    assert_eq!(headers["x-proxied-url"], target.as_str());

    let body = res.text().await.unwrap();
    let expected = format!(
        r#"href="http://{}/proxy/{}/about""#,
        proxy.addr,
        upstream.origin()
    );
    assert!(body.contains(&expected), "body: {}", body);
    assert!(body.contains(r#"src="https://cdn.example.net/x.png""#));
}

#[tokio::test]
async fn test_css_urls_are_rewritten() {
    let upstream = start_mock_upstream(|_| {
        MockResponse::new(200, "body{background:url('/img/bg.png')}").header("Content-Type", "text/css")
    })
    .await;
    let proxy = start_proxy(test_config()).await;

    let res = client()
        .get(proxy.proxied(&format!("{}/css/site.css", upstream.origin())))
        .send()
        .await
        .unwrap();
    let body = res.text().await.unwrap();
    assert_eq!(
        body,
        format!("body{{background:url('http://{}/proxy/{}/img/bg.png')}}", proxy.addr, upstream.origin())
    );
}

#[tokio::test]
async fn test_redirect_location_is_rewritten() {
    let upstream = start_mock_upstream(|_| {
        MockResponse::new(302, "").header("Location", "https://example.com/new")
    })
    .await;
    let mut config = test_config();
    config.upstream.follow_redirects = false;
    let proxy = start_proxy(config).await;

    let res = client()
        .get(proxy.proxied(&format!("{}/old", upstream.origin())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(
        res.headers()["location"],
        format!("http://{}/proxy/https://example.com/new", proxy.addr).as_str()
    );
}

#[tokio::test]
async fn test_redirect_hop_to_blocked_host_is_not_followed() {
    let upstream = start_mock_upstream(|_| {
        MockResponse::new(302, "").header("Location", "http://10.0.0.1/internal")
    })
    .await;
    let proxy = start_proxy(test_config()).await;

    let res = client()
        .get(proxy.proxied(&format!("{}/start", upstream.origin())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(
        res.headers()["location"],
        format!("http://{}/proxy/http://10.0.0.1/internal", proxy.addr).as_str()
    );
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_json_passes_through_unchanged() {
    const JSON: &str = r#"{"link":"/about","html":"<a href=\"/x\">"}"#;
    let upstream = start_mock_upstream(|_| {
        MockResponse::new(200, JSON).header("Content-Type", "application/json")
    })
    .await;
    let proxy = start_proxy(test_config()).await;

    let res = client()
        .get(proxy.proxied(&format!("{}/api", upstream.origin())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/json");
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert_eq!(res.bytes().await.unwrap().as_ref(), JSON.as_bytes());
}

#[tokio::test]
async fn test_private_targets_are_forbidden_without_upstream_calls() {
    let upstream = start_mock_upstream(|_| MockResponse::new(200, "should not be reached")).await;
    // Default denylist: loopback is blocked too.
    let proxy = start_proxy(ProxyConfig::default()).await;

    for target in [
        "http://192.168.1.10/".to_string(),
        "https://10.1.2.3/admin".to_string(),
        "http://172.20.0.1/".to_string(),
        format!("{}/", upstream.origin()),
        format!("http://localhost:{}/", upstream.addr.port()),
    ] {
        let res = client().get(proxy.proxied(&target)).send().await.unwrap();
        assert_eq!(res.status(), 403, "target {}", target);
        assert_eq!(res.headers()["cache-control"], "no-store");
    }
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_simplified_mode_and_query_merge() {
    let upstream = start_mock_upstream(|_| MockResponse::new(200, "ok")).await;
    let mut config = test_config();
    config.proxy.default_scheme = "http".into();
    let proxy = start_proxy(config).await;

    let url = format!("{}?q=1&q=2&r=a%20b", proxy.proxied(&format!("{}/data", upstream.addr)));
    let res = client().get(url).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(upstream.last_request().unwrap().path, "/data?q=1&q=2&r=a%20b");
}

#[tokio::test]
async fn test_request_headers_are_sanitized() {
    let upstream = start_mock_upstream(|_| MockResponse::new(200, "ok")).await;
    let proxy = start_proxy(test_config()).await;

    let res = client()
        .get(proxy.proxied(&format!("{}/h", upstream.origin())))
        .header("X-Forwarded-For", "203.0.113.7")
        .header("CF-Connecting-IP", "203.0.113.7")
        .header("X-Real-IP", "203.0.113.7")
        .header("User-Agent", "Cloudflare-Workers")
        .header("X-Custom", "kept")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let seen = upstream.last_request().unwrap();
    assert!(seen.header("x-forwarded-for").is_none());
    assert!(seen.header("cf-connecting-ip").is_none());
    assert!(seen.header("x-real-ip").is_none());
    assert_eq!(seen.header("host"), Some(upstream.addr.to_string().as_str()));
    assert_eq!(seen.header("referer"), Some(upstream.origin().as_str()));
    assert!(seen.header("user-agent").unwrap().starts_with("Mozilla/5.0"));
    assert_eq!(seen.header("x-custom"), Some("kept"));
}

#[tokio::test]
async fn test_method_and_body_are_forwarded() {
    let upstream = start_mock_upstream(|req| MockResponse::new(200, req.body.clone())).await;
    let proxy = start_proxy(test_config()).await;

    let res = client()
        .post(proxy.proxied(&format!("{}/submit", upstream.origin())))
        .body("a=1&b=2")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "a=1&b=2");

    let seen = upstream.last_request().unwrap();
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.body, b"a=1&b=2");
}

#[tokio::test]
async fn test_unreachable_upstream_is_500() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let proxy = start_proxy(test_config()).await;
    let res = client()
        .get(proxy.proxied(&format!("http://{}/", addr)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(res.headers()["cache-control"], "no-store");
    assert!(res.headers()["content-type"].to_str().unwrap().starts_with("text/plain"));
    assert!(res.text().await.unwrap().contains("upstream fetch failed"));
}

#[tokio::test]
async fn test_invalid_target_is_400() {
    let proxy = start_proxy(test_config()).await;
    let res = client()
        .get(proxy.proxied("https://exa mple.com/"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn test_foreign_scheme_is_400_without_upstream_calls() {
    let upstream = start_mock_upstream(|_| MockResponse::new(200, "should not be reached")).await;
    let proxy = start_proxy(test_config()).await;

    for target in [
        format!("ftp://{}/file", upstream.addr),
        format!("ws://{}/socket", upstream.addr),
    ] {
        let res = client().get(proxy.proxied(&target)).send().await.unwrap();
        assert_eq!(res.status(), 400, "target {}", target);
        assert_eq!(res.headers()["cache-control"], "no-store");
    }
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_legacy_charset_page_is_rewritten() {
    let upstream = start_mock_upstream(|_| {
        MockResponse::new(200, b"<p>caf\xe9</p><a href=\"/about\">x</a>".to_vec())
            .header("Content-Type", "text/html; charset=iso-8859-1")
    })
    .await;
    let proxy = start_proxy(test_config()).await;

    let res = client()
        .get(proxy.proxied(&format!("{}/", upstream.origin())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "text/html; charset=iso-8859-1");

    let body = res.bytes().await.unwrap();
    let expected = format!(r#"<a href="http://{}/proxy/{}/about">x</a>"#, proxy.addr, upstream.origin());
    assert!(body.starts_with(b"<p>caf\xe9</p>"), "body: {:?}", body);
    assert!(body.ends_with(expected.as_bytes()), "body: {:?}", body);
}

#[tokio::test]
async fn test_relative_links_resolve_against_redirect_target() {
    let upstream = start_mock_upstream(|req| match req.path.as_str() {
        "/docs" => MockResponse::new(301, "").header("Location", "/docs/"),
        _ => MockResponse::new(200, r#"<a href="intro.html">Intro</a>"#).header("Content-Type", "text/html"),
    })
    .await;
    let proxy = start_proxy(test_config()).await;

    let res = client()
        .get(proxy.proxied(&format!("{}/docs", upstream.origin())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-proxied-url"], format!("{}/docs/", upstream.origin()).as_str());

    let body = res.text().await.unwrap();
    let expected = format!(r#"href="http://{}/proxy/{}/docs/intro.html""#, proxy.addr, upstream.origin());
    assert!(body.contains(&expected), "body: {}", body);
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_chunked_html_is_rewritten() {
    let upstream = start_mock_upstream(|_| {
        MockResponse::new(200, r#"<html><body><a href="/about">About</a></body></html>"#)
            .header("Content-Type", "text/html")
            .chunked()
    })
    .await;
    let proxy = start_proxy(test_config()).await;

    let res = client()
        .get(proxy.proxied(&format!("{}/", upstream.origin())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body = res.text().await.unwrap();
    let expected = format!(r#"href="http://{}/proxy/{}/about""#, proxy.addr, upstream.origin());
    assert!(body.contains(&expected), "body: {}", body);
}

#[tokio::test]
async fn test_chunked_html_over_cap_is_500() {
    let upstream = start_mock_upstream(|_| {
        MockResponse::new(200, format!("<p>{}</p>", "x".repeat(64)))
            .header("Content-Type", "text/html")
            .chunked()
    })
    .await;
    let mut config = test_config();
    config.proxy.max_rewrite_bytes = 16;
    let proxy = start_proxy(config).await;

    let res = client()
        .get(proxy.proxied(&format!("{}/", upstream.origin())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(res.headers()["cache-control"], "no-store");
    assert!(res.headers()["content-type"].to_str().unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn test_usage_page() {
    let proxy = start_proxy(test_config()).await;
    for path in ["/proxy/", "/proxy"] {
        let res = client().get(proxy.url(path)).send().await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.headers()["cache-control"], "no-store");
        assert!(res.headers()["content-type"].to_str().unwrap().starts_with("text/html"));
        assert!(res.text().await.unwrap().contains("Edge Forward Proxy"));
    }
}

#[tokio::test]
async fn test_cache_serves_repeat_requests() {
    let upstream = start_mock_upstream(|_| {
        MockResponse::new(200, "<p>cached</p>").header("Content-Type", "text/html")
    })
    .await;
    let mut config = test_config();
    config.cache.enabled = true;
    let proxy = start_proxy(config).await;
    let url = proxy.proxied(&format!("{}/page", upstream.origin()));

    let first = client().get(&url).send().await.unwrap();
    assert_eq!(first.headers()["x-proxy-cache"], "MISS");
    assert_eq!(first.text().await.unwrap(), "<p>cached</p>");

    // The cache write is fire-and-forget.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let second = client().get(&url).send().await.unwrap();
    assert_eq!(second.headers()["x-proxy-cache"], "HIT");
    assert_eq!(second.text().await.unwrap(), "<p>cached</p>");
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_credentialed_requests_bypass_cache() {
    let upstream = start_mock_upstream(|req| {
        MockResponse::new(200, format!("<p>{}</p>", req.header("cookie").unwrap_or("anonymous")))
            .header("Content-Type", "text/html")
    })
    .await;
    let mut config = test_config();
    config.cache.enabled = true;
    let proxy = start_proxy(config).await;
    let url = proxy.proxied(&format!("{}/account", upstream.origin()));

    let alice = client().get(&url).header("Cookie", "session=alice").send().await.unwrap();
    assert!(!alice.headers().contains_key("x-proxy-cache"));
    assert_eq!(alice.text().await.unwrap(), "<p>session=alice</p>");

    tokio::time::sleep(Duration::from_millis(200)).await;

    let bob = client().get(&url).send().await.unwrap();
    assert_eq!(bob.headers()["x-proxy-cache"], "MISS");
    assert_eq!(bob.text().await.unwrap(), "<p>anonymous</p>");
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_responses_setting_cookies_are_not_stored() {
    let upstream = start_mock_upstream(|_| {
        MockResponse::new(200, "<p>welcome</p>")
            .header("Content-Type", "text/html")
            .header("Set-Cookie", "session=fresh")
    })
    .await;
    let mut config = test_config();
    config.cache.enabled = true;
    let proxy = start_proxy(config).await;
    let url = proxy.proxied(&format!("{}/login", upstream.origin()));

    let first = client().get(&url).send().await.unwrap();
    assert_eq!(first.headers()["x-proxy-cache"], "MISS");

    tokio::time::sleep(Duration::from_millis(200)).await;

    let second = client().get(&url).send().await.unwrap();
    assert_eq!(second.headers()["x-proxy-cache"], "MISS");
    assert_eq!(second.headers()["set-cookie"], "session=fresh");
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_oversized_html_streams_unrewritten() {
    const HTML: &str = r#"<a href="/about">About</a>"#;
    let upstream = start_mock_upstream(|_| MockResponse::new(200, HTML).header("Content-Type", "text/html")).await;
    let mut config = test_config();
    config.proxy.max_rewrite_bytes = 8;
    let proxy = start_proxy(config).await;

    let res = client()
        .get(proxy.proxied(&format!("{}/", upstream.origin())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), HTML);
}

#[tokio::test]
async fn test_healthz() {
    let proxy = start_proxy(test_config()).await;
    let res = client().get(proxy.url("/healthz")).send().await.unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}
