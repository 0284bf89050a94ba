//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs   (Axum router, middleware, hot reload)
//!     → request.rs  (request ID)
//!     → proxy::pipeline / site handlers
//!     → response.rs (CORS, security headers, Location)
//!     → client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id_middleware, RequestId, RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ProxyRuntime};
