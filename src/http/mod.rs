//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (axum-server)
//!     → server.rs (router, layers, lifecycle)
//!     → `/.kill`, live-reload script, websocket.rs (live-reload socket)
//!     → personality routes → pipeline
//!         → request.rs (normalize into RequestContext)
//!         → client.rs (origin fetch)
//!         → response.rs (HTML injection, auth pages)
//!     → Send to client
//! ```

pub mod client;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::{RequestContext, X_REQUEST_ID};
pub use server::{AppState, DevServer, ServerError};
