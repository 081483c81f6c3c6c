//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Validate configuration and assemble the delivery pipeline
//! - Negotiate port ownership and bind HTTP or HTTPS
//! - Build the Axum router: `/.kill`, live-reload script and socket,
//!   personality routes, tracing, timeout and body limit layers
//! - Publish lifecycle state and stop on request
//!
//! # Design Decisions
//! - One concrete server; preview and import differ only in the injected
//!   [`Personality`]
//! - Stop force-closes open connections and never fails

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use axum_server::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::validation::{validate_config, ValidationError};
use crate::config::DevServerConfig;
use crate::http::client::{FetchContext, FetchOptions};
use crate::http::websocket;
use crate::lifecycle::{ServerState, Shutdown};
use crate::livereload::{LiveReload, BOOTSTRAP_SCRIPT, SCRIPT_PATH, SOCKET_PATH};
use crate::net::listener::{negotiate_port, resolve_address, ListenerError};
use crate::net::tls::{load_tls_config, TlsError};
use crate::pipeline::{ContentIndexer, Pipeline};
use crate::routing::Personality;

/// Delay between answering `/.kill` and stopping, so the reply gets out.
const KILL_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {}", join_errors(.0))]
    Config(Vec<ValidationError>),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("live reload watcher failed: {0}")]
    Watcher(#[from] notify::Error),

    #[error("server was already started")]
    AlreadyStarted,
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DevServerConfig>,
    pub pipeline: Arc<Pipeline>,
    pub shutdown: Arc<Shutdown>,
}

struct Inner {
    config: Arc<DevServerConfig>,
    personality: Arc<dyn Personality>,
    state: AppState,
    handle: Mutex<Option<Handle>>,
    serve_task: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    status: watch::Sender<ServerState>,
}

/// Development server. Cheap to clone; clones share the same instance.
#[derive(Clone)]
pub struct DevServer {
    inner: Arc<Inner>,
}

impl DevServer {
    /// Validate `config` and build a server for `personality`.
    pub fn new(config: DevServerConfig, personality: Arc<dyn Personality>) -> Result<Self, ServerError> {
        Self::build(config, personality, None)
    }

    /// Like [`DevServer::new`], handing delivered HTML pages to `indexer`.
    pub fn with_indexer(
        config: DevServerConfig,
        personality: Arc<dyn Personality>,
        indexer: Arc<dyn ContentIndexer>,
    ) -> Result<Self, ServerError> {
        Self::build(config, personality, Some(indexer))
    }

    fn build(
        mut config: DevServerConfig,
        personality: Arc<dyn Personality>,
        indexer: Option<Arc<dyn ContentIndexer>>,
    ) -> Result<Self, ServerError> {
        personality.configure(&mut config);
        validate_config(&config).map_err(ServerError::Config)?;

        let fetch = Arc::new(FetchContext::new(FetchOptions {
            timeout: Duration::from_secs(config.proxy.timeout_secs),
            use_env_proxy: config.proxy.use_env_proxy,
        }));
        let mut pipeline = Pipeline::new(&config, fetch);
        if let Some(indexer) = indexer {
            pipeline = pipeline.with_indexer(indexer);
        }

        let config = Arc::new(config);
        let state = AppState {
            config: config.clone(),
            pipeline: Arc::new(pipeline),
            shutdown: Arc::new(Shutdown::new()),
        };
        let (status, _) = watch::channel(ServerState::Idle);

        tracing::debug!(
            personality = personality.name(),
            project = ?state.pipeline.project_dir(),
            origin = ?config.proxy.origin,
            "Server configured"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                personality,
                state,
                handle: Mutex::new(None),
                serve_task: Mutex::new(None),
                local_addr: Mutex::new(None),
                status,
            }),
        })
    }

    pub fn config(&self) -> &DevServerConfig {
        &self.inner.config
    }

    /// Handler state, shared with the router.
    pub fn app_state(&self) -> AppState {
        self.inner.state.clone()
    }

    pub fn live_reload(&self) -> Option<Arc<LiveReload>> {
        self.inner.state.pipeline.live_reload().cloned()
    }

    /// Address actually bound, once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.inner.local_addr)
    }

    /// Base URL of the running server.
    pub fn url(&self) -> Option<String> {
        self.local_addr()
            .map(|addr| format!("{}://{}", self.inner.config.listener.scheme(), addr))
    }

    pub fn server_state(&self) -> ServerState {
        *self.inner.status.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.inner.status.subscribe()
    }

    /// Resolve once the server reached [`ServerState::Stopped`].
    pub async fn stopped(&self) {
        let mut rx = self.subscribe_state();
        let _ = rx.wait_for(|s| *s == ServerState::Stopped).await;
    }

    /// Negotiate the port, bind and start serving.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let started = self.inner.status.send_if_modified(|s| {
            if *s == ServerState::Idle {
                *s = ServerState::Starting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ServerError::AlreadyStarted);
        }

        match self.try_start().await {
            Ok(addr) => {
                self.inner.status.send_replace(ServerState::Running);
                tracing::info!(
                    personality = self.inner.personality.name(),
                    url = %format!("{}://{}", self.inner.config.listener.scheme(), addr),
                    "Server started"
                );
                Ok(addr)
            }
            Err(e) => {
                tracing::error!(error = %e, "Server failed to start");
                self.inner.status.send_replace(ServerState::Stopped);
                Err(e)
            }
        }
    }

    async fn try_start(&self) -> Result<SocketAddr, ServerError> {
        let listener = &self.inner.config.listener;
        let tls = match &listener.tls {
            Some(tls) => Some(load_tls_config(&tls.cert_path, &tls.key_path).await?),
            None => None,
        };

        let addr = resolve_address(listener).await?;
        negotiate_port(listener, addr).await?;

        let state = self.inner.state.clone();
        self.inner.personality.on_start(&state)?;

        // Subscribe before serving so an early `/.kill` is not missed.
        let kill_rx = state.shutdown.subscribe();

        let router = build_router(&self.inner.config, self.inner.personality.as_ref(), state.clone());
        let handle = Handle::new();
        let server_handle = handle.clone();
        let task = match tls {
            Some(tls) => tokio::spawn(async move {
                axum_server::bind_rustls(addr, tls)
                    .handle(server_handle)
                    .serve(router.into_make_service())
                    .await
            }),
            None => tokio::spawn(async move {
                axum_server::bind(addr)
                    .handle(server_handle)
                    .serve(router.into_make_service())
                    .await
            }),
        };

        let Some(bound) = handle.listening().await else {
            let source = match task.await {
                Ok(Err(e)) => e,
                Ok(Ok(())) => std::io::Error::other("server exited before listening"),
                Err(e) => std::io::Error::other(e),
            };
            self.inner.personality.on_stop(&state);
            return Err(ServerError::Bind { addr, source });
        };

        *lock(&self.inner.handle) = Some(handle);
        *lock(&self.inner.serve_task) = Some(task);
        *lock(&self.inner.local_addr) = Some(bound);

        tokio::spawn(kill_switch(Arc::downgrade(&self.inner), kill_rx));
        Ok(bound)
    }

    /// Stop serving. Idempotent; errors are logged, never returned.
    pub async fn stop(&self) {
        let stopping = self.inner.status.send_if_modified(|s| {
            if s.is_shutting_down() {
                false
            } else {
                *s = ServerState::Stopping;
                true
            }
        });
        if !stopping {
            return;
        }
        tracing::info!("Stopping server");

        if let Some(handle) = lock(&self.inner.handle).take() {
            handle.shutdown();
        }
        let task = lock(&self.inner.serve_task).take();
        if let Some(task) = task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Server exited with error"),
                Err(e) => tracing::warn!(error = %e, "Server task failed"),
            }
        }

        self.inner.personality.on_stop(&self.inner.state);
        self.inner.state.pipeline.fetch().reset();
        self.inner.status.send_replace(ServerState::Stopped);
        self.inner.state.shutdown.trigger();
        tracing::info!("Server stopped");
    }
}

async fn kill_switch(server: Weak<Inner>, mut rx: tokio::sync::broadcast::Receiver<()>) {
    if rx.recv().await.is_err() {
        return;
    }
    if let Some(inner) = server.upgrade() {
        DevServer { inner }.stop().await;
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
fn build_router(config: &DevServerConfig, personality: &dyn Personality, state: AppState) -> Router {
    let router = Router::new()
        .route("/.kill", get(kill_handler))
        .route(SCRIPT_PATH, get(live_reload_script))
        .route(SOCKET_PATH, get(websocket::live_reload_socket));

    personality
        .install_routes(router)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.proxy.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(config.proxy.timeout_secs)))
        .layer(TraceLayer::new_for_http())
}

async fn kill_handler(State(state): State<AppState>) -> &'static str {
    tracing::info!("Kill requested");
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(KILL_DELAY).await;
        shutdown.trigger();
    });
    "Goodbye!"
}

async fn live_reload_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        BOOTSTRAP_SCRIPT,
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
