//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! (bind_address, port)
//!     → listener.rs (resolve, probe, ask previous instance to quit, poll)
//!     → tls.rs (optional: validate PEM material, build rustls config)
//!     → axum-server bind / bind_rustls (http/server.rs)
//! ```
//!
//! # Design Decisions
//! - Port ownership is negotiated before binding, with a bounded poll
//! - TLS material is checked up front so a bad cert fails `start`, not the
//!   first handshake

pub mod listener;
pub mod tls;
