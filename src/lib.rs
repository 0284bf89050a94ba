//! Edge forward proxy library.
//!
//! Fetches the URL embedded in the request path, rewrites HTML and CSS so
//! that references keep pointing back through the proxy, and answers with
//! permissive CORS headers.

// Proxy core
pub mod proxy;
pub mod rewrite;
pub mod security;

// Serving
pub mod cache;
pub mod http;
pub mod site;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
