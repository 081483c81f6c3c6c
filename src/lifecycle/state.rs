//! Server lifecycle states.

use std::fmt;

/// Where a server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerState {
    /// Constructed, never started.
    #[default]
    Idle,
    /// Negotiating the port and binding.
    Starting,
    /// Accepting connections.
    Running,
    /// Closing connections and running teardown hooks.
    Stopping,
    /// Fully stopped. Terminal.
    Stopped,
}

impl ServerState {
    /// True once a stop has begun.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, ServerState::Stopping | ServerState::Stopped)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Idle => "idle",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
            ServerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
