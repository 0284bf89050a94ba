//! Stylesheet `url(...)` rewriting.
//!
//! A small scanner over the CSS token stream: comments and string literals
//! are copied through, `url(` function tokens have their argument converted.
//! A malformed `url(` (no closing parenthesis or quote) is copied verbatim
//! and scanning continues after it.

use encoding_rs::Encoding;

use super::url::convert_url;
use super::RewriteError;
use crate::proxy::target::RewriteContext;

/// Rewrite a stylesheet held in `charset` (UTF-8 when undeclared) and encode
/// the result back into it.
pub fn rewrite_css_bytes(
    input: &[u8],
    charset: Option<&'static Encoding>,
    ctx: &RewriteContext,
) -> Result<Vec<u8>, RewriteError> {
    let encoding = charset.unwrap_or(encoding_rs::UTF_8);
    if encoding.output_encoding() != encoding {
        return Err(RewriteError::UnsupportedEncoding(encoding.name()));
    }
    let (text, _) = encoding.decode_without_bom_handling(input);
    let rewritten = rewrite_css(&text, ctx);
    let (bytes, _, _) = encoding.encode(&rewritten);
    Ok(bytes.into_owned())
}

/// Rewrite every `url(...)` reference in a stylesheet.
pub fn rewrite_css(input: &str, ctx: &RewriteContext) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = match input[i + 2..].find("*/") {
                    Some(end) => i + 2 + end + 2,
                    None => bytes.len(),
                };
            }
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
            }
            b'\\' => {
                i += 2;
            }
            b'u' | b'U' if is_url_function(input, i) => {
                let args_start = i + 4;
                match parse_url_argument(input, args_start) {
                    Ok(arg) => {
                        let replacement = convert_url(arg.value, ctx);
                        if replacement != arg.value {
                            out.push_str(&input[copied..arg.value_start]);
                            push_css_value(&mut out, &replacement, arg.quote);
                            copied = arg.value_end;
                        }
                        i = arg.close + 1;
                    }
                    Err(e) => {
                        tracing::trace!(error = %e, offset = i, "Skipping malformed url()");
                        // Resume past the opening quote so the rest is still scanned.
                        i = args_start;
                        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                            i += 1;
                        }
                        i += 1;
                    }
                }
            }
            _ => i += 1,
        }
    }

    out.push_str(&input[copied.min(input.len())..]);
    out
}

struct UrlArgument<'a> {
    value: &'a str,
    value_start: usize,
    value_end: usize,
    quote: Option<u8>,
    close: usize,
}

/// `url(` preceded by something that cannot continue an identifier.
fn is_url_function(input: &str, i: usize) -> bool {
    let bytes = input.as_bytes();
    let Some(name) = input.get(i..i + 4) else {
        return false;
    };
    if !name.eq_ignore_ascii_case("url(") {
        return false;
    }
    match i.checked_sub(1).map(|p| bytes[p]) {
        Some(prev) => !(prev.is_ascii_alphanumeric() || prev == b'-' || prev == b'_'),
        None => true,
    }
}

fn parse_url_argument(input: &str, start: usize) -> Result<UrlArgument<'_>, RewriteError> {
    let bytes = input.as_bytes();
    let mut i = start;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }

    if let Some(&quote) = bytes.get(i).filter(|b| **b == b'"' || **b == b'\'') {
        let value_start = i + 1;
        let after = skip_string(bytes, i);
        if after > bytes.len() || bytes.get(after - 1) != Some(&quote) || after - 1 < value_start {
            return Err(RewriteError::Unterminated("url() string"));
        }
        let value_end = after - 1;
        let mut close = after;
        while close < bytes.len() && bytes[close].is_ascii_whitespace() {
            close += 1;
        }
        if bytes.get(close) != Some(&b')') {
            return Err(RewriteError::Unterminated("url()"));
        }
        return Ok(UrlArgument {
            value: &input[value_start..value_end],
            value_start,
            value_end,
            quote: Some(quote),
            close,
        });
    }

    let value_start = i;
    let close = input[i..]
        .find(')')
        .map(|p| i + p)
        .ok_or(RewriteError::Unterminated("url()"))?;
    let raw = &input[value_start..close];
    let value = raw.trim_end();
    if value.contains(['"', '\'', '(']) {
        return Err(RewriteError::Unterminated("url() argument"));
    }
    Ok(UrlArgument {
        value,
        value_start,
        value_end: value_start + value.len(),
        quote: None,
        close,
    })
}

/// Index just past the closing quote of the string starting at `start`,
/// or `bytes.len()` if it never closes.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            b'\n' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn push_css_value(out: &mut String, value: &str, quote: Option<u8>) {
    match quote {
        Some(q) => {
            let q = q as char;
            for c in value.chars() {
                if c == q || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
        }
        None => {
            for c in value.chars() {
                if matches!(c, '(' | ')' | '"' | '\'' | '\\') || c.is_whitespace() {
                    out.push('\\');
                }
                out.push(c);
            }
        }
    }
}
