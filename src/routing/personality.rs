//! Personality seam between the server and the delivery mode.

use axum::Router;

use crate::config::DevServerConfig;
use crate::http::server::{AppState, ServerError};

/// Route installer plus lifecycle hooks for one kind of dev server.
pub trait Personality: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Adjust the configuration before it is validated.
    fn configure(&self, _config: &mut DevServerConfig) {}

    /// Add the catch-all delivery routes.
    fn install_routes(&self, router: Router<AppState>) -> Router<AppState>;

    /// Runs after the port was negotiated, before binding.
    fn on_start(&self, _state: &AppState) -> Result<(), ServerError> {
        Ok(())
    }

    /// Runs after connections were closed.
    fn on_stop(&self, _state: &AppState) {}
}
