//! HTML document rewriting.
//!
//! Streams the document through `lol_html` and applies the URL conversion to:
//! - URL-bearing attributes (`href`, `src`, `action`, ...)
//! - `srcset` candidate lists
//! - `style` attributes and `<style>` blocks (CSS `url(...)`)
//! - string literals passed to `fetch` / `xhr.open` in inline scripts
//! - `<meta http-equiv="refresh" content="N;url=...">`
//!
//! Tokens that are not touched keep their original bytes, in the document's
//! own encoding.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};

use encoding_rs::Encoding;
use lol_html::html_content::{ContentType, TextChunk};
use lol_html::{element, text, AsciiCompatibleEncoding, HtmlRewriter, Settings};
use once_cell::sync::Lazy;
use regex::Regex;

use super::css::rewrite_css;
use super::script::rewrite_script;
use super::url::convert_url;
use super::RewriteError;
use crate::proxy::target::RewriteContext;

/// Attributes whose whole value is a single URL.
pub const URL_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "action",
    "data",
    "poster",
    "cite",
    "background",
    "profile",
    "formaction",
    "icon",
    "manifest",
    "archive",
];

static META_REFRESH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^(?P<pre>\s*[\d.]*\s*[;,]?\s*url\s*=\s*)(?P<q>['"]?)(?P<url>[^'"]*?)(?P<post>['"]?\s*)$"#)
        .expect("meta refresh regex")
});

/// Rewrite a UTF-8 HTML document. A document the parser rejects is returned
/// unchanged.
pub fn rewrite_html(input: &str, ctx: &RewriteContext) -> String {
    match rewrite_html_bytes(input.as_bytes(), Some(encoding_rs::UTF_8), ctx) {
        Ok(out) => String::from_utf8(out)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()),
        Err(e) => {
            tracing::debug!(error = %e, "HTML rewrite failed, keeping document");
            input.to_string()
        }
    }
}

/// Rewrite an HTML document in its own encoding.
///
/// `charset` is the encoding declared by the response headers. Without one the
/// document is read as UTF-8 until a `<meta charset>` says otherwise.
/// Encodings that are not ASCII compatible (UTF-16) are refused.
pub fn rewrite_html_bytes(
    input: &[u8],
    charset: Option<&'static Encoding>,
    ctx: &RewriteContext,
) -> Result<Vec<u8>, RewriteError> {
    let declared = charset.unwrap_or(encoding_rs::UTF_8);
    let encoding = AsciiCompatibleEncoding::new(declared)
        .ok_or(RewriteError::UnsupportedEncoding(declared.name()))?;

    let script_is_js = Cell::new(true);
    let style_text = RefCell::new(String::new());
    let script_text = RefCell::new(String::new());
    let mut output = Vec::with_capacity(input.len() + input.len() / 4);

    let settings = Settings {
        element_content_handlers: vec![
            element!("*", |el| {
                let is_refresh = el.tag_name().eq_ignore_ascii_case("meta")
                    && el
                        .get_attribute("http-equiv")
                        .is_some_and(|v| v.trim().eq_ignore_ascii_case("refresh"));

                let updates: Vec<(String, String)> = el
                    .attributes()
                    .iter()
                    .filter_map(|attr| {
                        let name = attr.name();
                        let raw = attr.value();
                        let decoded = decode_entities(&raw);
                        let rewritten = rewrite_attribute(&name, &decoded, is_refresh, ctx)?;
                        (rewritten != *decoded).then(|| (name, rewritten.replace('&', "&amp;")))
                    })
                    .collect();

                for (name, value) in updates {
                    el.set_attribute(&name, &value)?;
                }
                Ok(())
            }),
            element!("script", |el| {
                script_is_js.set(is_javascript(el.get_attribute("type").as_deref()));
                Ok(())
            }),
            text!("style", |t| {
                replace_when_complete(t, &style_text, |css| rewrite_css(css, ctx));
                Ok(())
            }),
            text!("script", |t| {
                if script_is_js.get() {
                    replace_when_complete(t, &script_text, |js| rewrite_script(js, ctx));
                }
                Ok(())
            }),
        ],
        document_content_handlers: vec![],
        encoding,
        strict: false,
        adjust_charset_on_meta_tag: charset.is_none(),
        ..Settings::default()
    };

    let mut rewriter = HtmlRewriter::new(settings, |chunk: &[u8]| output.extend_from_slice(chunk));
    rewriter.write(input)?;
    rewriter.end()?;
    Ok(output)
}

/// Rewritten value of one attribute, or `None` when it carries no reference.
fn rewrite_attribute(name: &str, value: &str, is_refresh: bool, ctx: &RewriteContext) -> Option<String> {
    if URL_ATTRIBUTES.iter().any(|a| name.eq_ignore_ascii_case(a)) {
        Some(convert_url(value, ctx))
    } else if name.eq_ignore_ascii_case("srcset") || name.eq_ignore_ascii_case("imagesrcset") {
        Some(rewrite_srcset(value, ctx))
    } else if name.eq_ignore_ascii_case("style") {
        Some(rewrite_css(value, ctx))
    } else if is_refresh && name.eq_ignore_ascii_case("content") {
        Some(rewrite_refresh(value, ctx))
    } else {
        None
    }
}

/// Raw text arrives in chunks. Collect them and emit the rewritten text in
/// place of the last one.
fn replace_when_complete(
    chunk: &mut TextChunk<'_>,
    buffer: &RefCell<String>,
    rewrite: impl FnOnce(&str) -> String,
) {
    let mut text = buffer.borrow_mut();
    text.push_str(chunk.as_str());
    if chunk.last_in_text_node() {
        let rewritten = rewrite(&text);
        chunk.replace(&rewritten, ContentType::Html);
        text.clear();
    } else {
        chunk.remove();
    }
}

/// Rewrite each candidate URL of a `srcset` value, keeping descriptors.
pub fn rewrite_srcset(value: &str, ctx: &RewriteContext) -> String {
    let mut out = String::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        // Separators and leading whitespace.
        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b',') {
            i += 1;
        }
        out.push_str(&value[start..i]);
        if i >= bytes.len() {
            break;
        }

        let url_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        // A trailing comma on the URL ends the candidate.
        let mut url_end = i;
        while url_end > url_start && bytes[url_end - 1] == b',' {
            url_end -= 1;
        }
        out.push_str(&convert_url(&value[url_start..url_end], ctx));
        out.push_str(&value[url_end..i]);
        if url_end < i {
            continue;
        }

        // Descriptor, up to the next comma.
        let desc_start = i;
        while i < bytes.len() && bytes[i] != b',' {
            i += 1;
        }
        out.push_str(&value[desc_start..i]);
    }

    out
}

/// Rewrite the URL part of a meta refresh `content` value.
pub fn rewrite_refresh(value: &str, ctx: &RewriteContext) -> String {
    let Some(caps) = META_REFRESH_RE.captures(value) else {
        return value.to_string();
    };
    let url = caps.name("url").map(|m| m.as_str()).unwrap_or_default();
    if url.is_empty() {
        return value.to_string();
    }
    format!(
        "{}{}{}{}",
        &caps["pre"],
        &caps["q"],
        convert_url(url, ctx),
        &caps["post"]
    )
}

fn is_javascript(kind: Option<&str>) -> bool {
    let Some(kind) = kind else {
        return true;
    };
    let kind = kind.trim().to_ascii_lowercase();
    kind.is_empty()
        || kind == "module"
        || kind.contains("javascript")
        || kind.contains("ecmascript")
        || kind == "text/jscript"
}

/// Decode the character references that commonly appear in URL attributes.
pub fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &after[..end];
            let c = match entity {
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}
