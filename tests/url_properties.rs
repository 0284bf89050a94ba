//! Property tests for reference conversion.

use edge_forward_proxy::proxy::target::{resolve_target, RewriteContext};
use edge_forward_proxy::rewrite::convert_url;
use proptest::prelude::*;

const PROXY_BASE: &str = "http://proxy.local/proxy/https://example.com";

fn ctx() -> RewriteContext {
    let spec = resolve_target("https://example.com/docs/index.html", None, "https").unwrap();
    RewriteContext::new(&spec, "http://proxy.local", "/proxy/")
}

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9_-]{1,12}"
}

fn path() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..5).prop_map(|parts| format!("/{}", parts.join("/")))
}

proptest! {
    #[test]
    fn fragments_and_queries_pass_through(tail in "[a-zA-Z0-9=&_-]{0,20}") {
        let ctx = ctx();
        let fragment = format!("#{}", tail);
        let query = format!("?{}", tail);
        prop_assert_eq!(convert_url(&fragment, &ctx), fragment);
        prop_assert_eq!(convert_url(&query, &ctx), query);
    }

    #[test]
    fn non_http_schemes_pass_through(
        scheme in prop::sample::select(vec!["data:", "javascript:", "mailto:", "tel:", "DATA:", "JavaScript:"]),
        rest in "[a-zA-Z0-9(),;+@.]{0,24}",
    ) {
        let raw = format!("{}{}", scheme, rest);
        prop_assert_eq!(convert_url(&raw, &ctx()), raw);
    }

    #[test]
    fn cross_origin_absolute_urls_are_unchanged(host in "[a-z]{3,10}\\.(net|org|io)", path in path()) {
        let raw = format!("https://{}{}", host, path);
        prop_assert_eq!(convert_url(&raw, &ctx()), raw);
    }

    #[test]
    fn root_relative_paths_are_prefixed(path in path(), query in prop::option::of("[a-z]{1,5}=[0-9]{1,3}")) {
        let raw = match &query {
            Some(q) => format!("{}?{}", path, q),
            None => path.clone(),
        };
        prop_assert_eq!(convert_url(&raw, &ctx()), format!("{}{}", PROXY_BASE, raw));
    }

    #[test]
    fn same_origin_absolute_urls_are_prefixed(path in path()) {
        let raw = format!("https://example.com{}", path);
        prop_assert_eq!(convert_url(&raw, &ctx()), format!("{}{}", PROXY_BASE, path));
    }

    #[test]
    fn already_proxied_root_paths_are_wrapped_again(path in path()) {
        // `/proxy/https://other.net/...` is a root-relative path on the target.
        let raw = format!("/proxy/https://other.net{}", path);
        prop_assert_eq!(convert_url(&raw, &ctx()), format!("{}{}", PROXY_BASE, raw));
    }

    #[test]
    fn fully_qualified_proxy_urls_are_unchanged(path in path()) {
        let raw = format!("http://proxy.local/proxy/https://other.net{}", path);
        prop_assert_eq!(convert_url(&raw, &ctx()), raw);
    }
}
