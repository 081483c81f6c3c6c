//! Server personalities.
//!
//! # Data Flow
//! ```text
//! DevServer::new(config, personality)
//!     → personality.configure(&mut config)
//!     → personality.install_routes(router)   (catch-all handlers)
//!     → personality.on_start / on_stop       (lifecycle hooks)
//!
//! preview.rs: local project + configured origin, live reload, head merge
//! import.rs:  origin picked per browser via `?host=` / cookie
//! ```
//!
//! # Design Decisions
//! - Personalities are injected, not subclassed: the server stays one type
//! - Hooks are synchronous; long-running work is spawned

pub mod import;
pub mod personality;
pub mod preview;

pub use import::ImportPersonality;
pub use personality::Personality;
pub use preview::PreviewPersonality;
