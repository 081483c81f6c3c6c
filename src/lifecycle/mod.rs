//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Server state (state.rs):
//!     Idle → Starting → Running → Stopping → Stopped
//!
//! Kill switch (shutdown.rs):
//!     GET /.kill or stop() → broadcast → controller task stops the server
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → binary stops the server
//! ```
//!
//! # Design Decisions
//! - State is published on a watch channel so callers can await transitions
//! - Shutdown force-closes connections; in-flight requests are not drained

pub mod shutdown;
pub mod signals;
pub mod state;

pub use shutdown::Shutdown;
pub use state::ServerState;
