//! Content rewriting.
//!
//! Every reference in a proxied HTML document or stylesheet that points back
//! at the target origin is redirected through the proxy prefix, so that
//! navigation and subresource loads keep flowing through the proxy.
//!
//! Rewriting is best effort and never fails a response: a reference that
//! cannot be parsed is left as it was.

pub mod css;
pub mod html;
pub mod script;
pub mod url;

pub use css::{rewrite_css, rewrite_css_bytes};
pub use html::{rewrite_html, rewrite_html_bytes};
pub use script::rewrite_script;
pub use self::url::convert_url;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("invalid reference {reference:?}: {source}")]
    Url {
        reference: String,
        #[source]
        source: ::url::ParseError,
    },

    #[error("unterminated {0}")]
    Unterminated(&'static str),

    #[error("cannot rewrite {0} documents")]
    UnsupportedEncoding(&'static str),

    #[error("HTML rewrite failed: {0}")]
    Html(#[from] lol_html::errors::RewritingError),
}
