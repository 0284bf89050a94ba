//! Best-effort rewriting of URL literals in inline scripts.
//!
//! Only string literals passed directly to `fetch(...)` and the URL argument
//! of `XMLHttpRequest.prototype.open(method, url)` are touched. URLs built at
//! runtime (concatenation, template interpolation, variables) are not seen.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::url::convert_url;
use crate::proxy::target::RewriteContext;

static FETCH_LITERAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?P<pre>\bfetch\s*\(\s*)(?:"(?P<dq>[^"\\\r\n]*)"|'(?P<sq>[^'\\\r\n]*)'|`(?P<bq>[^`\\$]*)`)"#)
        .expect("fetch literal regex")
});

static XHR_OPEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?P<pre>\.open\s*\(\s*(?:"[A-Za-z]+"|'[A-Za-z]+')\s*,\s*)(?:"(?P<dq>[^"\\\r\n]*)"|'(?P<sq>[^'\\\r\n]*)'|`(?P<bq>[^`\\$]*)`)"#)
        .expect("xhr open regex")
});

/// Rewrite `fetch` / `xhr.open` URL literals in script source.
pub fn rewrite_script(input: &str, ctx: &RewriteContext) -> String {
    let pass = replace_literals(&FETCH_LITERAL_RE, input, ctx);
    replace_literals(&XHR_OPEN_RE, &pass, ctx)
}

fn replace_literals(re: &Regex, input: &str, ctx: &RewriteContext) -> String {
    re.replace_all(input, |caps: &Captures| {
        let pre = caps.name("pre").map(|m| m.as_str()).unwrap_or_default();
        let (quote, raw) = if let Some(m) = caps.name("dq") {
            ('"', m.as_str())
        } else if let Some(m) = caps.name("sq") {
            ('\'', m.as_str())
        } else if let Some(m) = caps.name("bq") {
            ('`', m.as_str())
        } else {
            return caps[0].to_string();
        };

        let converted = convert_url(raw, ctx);
        if converted.contains(quote) {
            return caps[0].to_string();
        }
        format!("{pre}{quote}{converted}{quote}")
    })
    .into_owned()
}
