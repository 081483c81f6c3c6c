//! Local development server for Helix/AEM sites.
//!
//! # Architecture Overview
//!
//! ```text
//!     Browser request
//!     ───────────────▶ net (port negotiation, TLS)
//!                      http::server (router, /.kill, live-reload routes)
//!                      routing (preview | import personality)
//!                        │
//!                        ▼
//!                      pipeline
//!                        ├─ local file   (security::paths)
//!                        ├─ cache        (cache)
//!                        └─ origin fetch (http::client, security::headers)
//!                             └─ shaping (head_html, http::response)
//!     Browser response
//!     ◀───────────────
//!
//!     File change ───▶ livereload (notify → debounce → reload over WebSocket)
//! ```

pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod livereload;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod routing;
pub mod security;

pub use config::DevServerConfig;
pub use http::{DevServer, ServerError};
pub use lifecycle::ServerState;
pub use routing::{ImportPersonality, Personality, PreviewPersonality};
