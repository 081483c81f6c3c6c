//! Live-reload subsystem.
//!
//! # Data Flow
//! ```text
//! Request serving local files
//!     → start_request / register_file / end_request
//!     → WatchedFileMapping (file → source paths) + directory watch
//!
//! notify event
//!     → raw change channel
//!     → debounce (window restarts on every event)
//!     → map files to source paths
//!     → `reload` to every open client (http/websocket.rs)
//! ```
//!
//! # Design Decisions
//! - Files are mapped only after a request actually read them
//! - Parent directories are watched so editors that replace files on save
//!   still produce events
//! - The mapping is never evicted; it is bounded by the project size

pub mod protocol;
pub mod server;

pub use protocol::{ClientCommand, ServerCommand};
pub use server::{ClientConnection, ConnectionState, LiveReload, TrackedRequest};

/// Route serving the bootstrap script.
pub const SCRIPT_PATH: &str = "/__internal__/livereload.js";

/// Route accepting the WebSocket upgrade.
pub const SOCKET_PATH: &str = "/livereload";

/// Browser side of the protocol.
pub const BOOTSTRAP_SCRIPT: &str = include_str!("../../assets/livereload.js");

/// Tag injected into HTML pages.
pub fn script_tag() -> String {
    format!("<script src=\"{}\"></script>", SCRIPT_PATH)
}
