//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DevServerConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → failures surfaced as live-reload alerts
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server starts
//! - All fields have defaults to allow minimal configs
//! - The default origin is derived from git metadata (origin.rs)

pub mod loader;
pub mod origin;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::CacheConfig;
pub use schema::DevServerConfig;
pub use schema::ListenerConfig;
pub use schema::LiveReloadConfig;
pub use schema::ProjectConfig;
pub use schema::ProxyConfig;
pub use schema::TlsConfig;
