//! On-disk response cache.
//!
//! # Data Flow
//! ```text
//! GET /path?query
//!     → key.rs (path + query → bounded relative file path)
//!     → store.rs (body file + `.meta.json` sidecar)
//! ```
//!
//! # Design Decisions
//! - Only GET/HEAD responses are cached
//! - Writes are best effort; failures are logged, never fatal
//! - Reads never fail; anything unreadable is a miss
//! - No locking: concurrent writers of the same URL race, last one wins

pub mod key;
pub mod store;

pub use key::cache_key;
pub use store::{CacheEntry, CacheError, CachedHeader, ResponseCache};
