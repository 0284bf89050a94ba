//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Resolved target:
//!     → target_filter.rs (scheme + host denylist, before any network call)
//!     → headers.rs (strip identifying headers, point Host/Referer at target)
//!     → Pass to upstream fetcher
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any filter match without contacting upstream
//! - No trust in client-supplied forwarding headers
//! - The host filter is literal (see `target_filter` for its known gaps)

pub mod headers;
pub mod target_filter;

pub use headers::{sanitize_request_headers, HeaderPolicy};
pub use target_filter::TargetFilter;
