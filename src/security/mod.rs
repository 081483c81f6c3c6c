//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → paths.rs (keep local file lookups inside the project directory)
//!     → headers.rs (drop hop-by-hop headers, allow-list cookies)
//!     → Forward to origin
//!
//! Origin response:
//!     → headers.rs (strip stale encoding/length, framing and CSP; force CORS)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a path escaping the project directory is a 403
//! - Only the auth cookie reaches the origin unless configured otherwise

pub mod headers;
pub mod paths;
