//! Preview personality: the local project in front of the configured origin.

use std::sync::Mutex;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::http::server::{AppState, ServerError};
use crate::pipeline::DeliveryOptions;
use crate::routing::Personality;

pub struct PreviewPersonality {
    head_watch: Mutex<Option<JoinHandle<()>>>,
}

impl PreviewPersonality {
    pub fn new() -> Self {
        Self {
            head_watch: Mutex::new(None),
        }
    }
}

impl Default for PreviewPersonality {
    fn default() -> Self {
        Self::new()
    }
}

impl Personality for PreviewPersonality {
    fn name(&self) -> &'static str {
        "preview"
    }

    fn install_routes(&self, router: Router<AppState>) -> Router<AppState> {
        router
            .route("/{*path}", any(preview_handler))
            .route("/", any(preview_handler))
    }

    fn on_start(&self, state: &AppState) -> Result<(), ServerError> {
        let Some(live_reload) = state.pipeline.live_reload().cloned() else {
            return Ok(());
        };
        live_reload.start()?;

        // Edits to the local head.html must bypass its cached copy.
        if let Some(head) = state.pipeline.head_html().cloned() {
            let mut changes = live_reload.subscribe_changes();
            let task = tokio::spawn(async move {
                loop {
                    match changes.recv().await {
                        Ok(files) => {
                            if files.iter().any(|f| f == head.file_path()) {
                                head.invalidate_local().await;
                            }
                        }
                        Err(RecvError::Lagged(_)) => head.invalidate_local().await,
                        Err(RecvError::Closed) => break,
                    }
                }
            });
            let previous = self
                .head_watch
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .replace(task);
            if let Some(previous) = previous {
                previous.abort();
            }
        }
        Ok(())
    }

    fn on_stop(&self, state: &AppState) {
        if let Some(task) = self.head_watch.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        if let Some(live_reload) = state.pipeline.live_reload() {
            live_reload.stop();
        }
    }
}

async fn preview_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let options = DeliveryOptions {
        origin: state.pipeline.origin().cloned(),
        live_reload: true,
        head_merge: true,
    };
    state.pipeline.deliver(request, &options).await
}
