//! Forward proxy core.
//!
//! # Data Flow
//! ```text
//! /proxy/<target>
//!     → target.rs   (ProxySpec, RewriteContext)
//!     → pipeline.rs (filter, sanitize, fetch, transform)
//!     → fetch.rs    (outbound client)
//! ```

pub mod fetch;
pub mod pipeline;
pub mod target;

pub use fetch::UpstreamFetcher;
pub use pipeline::ProxyPipeline;
pub use target::{resolve_target, ProxySpec, RewriteContext};
