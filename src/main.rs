//! helix-dev-server binary.
//!
//! Loads the configuration (file, then CLI overrides), installs logging and
//! metrics, starts the preview or import server and runs until Ctrl+C or
//! `GET /.kill`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use notify::RecommendedWatcher;

use helix_dev_server::config::loader::load_config;
use helix_dev_server::config::origin::{origin_from, GitInfo, StaticGitMetadata};
use helix_dev_server::config::watcher::ConfigWatcher;
use helix_dev_server::lifecycle::signals::terminate_signal;
use helix_dev_server::observability::{logging, metrics};
use helix_dev_server::{DevServer, DevServerConfig, ImportPersonality, Personality, PreviewPersonality};

#[derive(Parser, Debug)]
#[command(name = "helix-dev-server", version, about = "Local development server for Helix/AEM sites")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Project directory served locally.
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Port to listen on (0 picks a free one).
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind.
    #[arg(long)]
    addr: Option<String>,

    /// Origin URL to proxy to.
    #[arg(long)]
    url: Option<String>,

    /// Cache origin responses in this directory.
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Disable live reload.
    #[arg(long)]
    no_livereload: bool,

    /// Stop another instance holding the port.
    #[arg(long)]
    kill: bool,

    /// Skip TLS certificate verification towards the origin.
    #[arg(long)]
    allow_insecure: bool,

    /// Run the content-import proxy instead of the preview server.
    #[arg(long)]
    import: bool,

    /// Repository owner, used to derive the default origin.
    #[arg(long)]
    owner: Option<String>,

    /// Repository name, used to derive the default origin.
    #[arg(long)]
    repo: Option<String>,

    /// Branch, used to derive the default origin.
    #[arg(long = "ref", default_value = "main")]
    git_ref: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut DevServerConfig) {
        if let Some(directory) = &self.directory {
            config.project.directory = directory.clone();
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(addr) = &self.addr {
            config.listener.bind_address = addr.clone();
        }
        if let Some(url) = &self.url {
            config.proxy.origin = Some(url.clone());
        }
        if let Some(cache) = &self.cache {
            config.cache.directory = Some(cache.clone());
        }
        if self.no_livereload {
            config.live_reload.enabled = false;
        }
        if self.kill {
            config.listener.kill_other = true;
        }
        if self.allow_insecure {
            config.proxy.allow_insecure = true;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }

    fn git_info(&self) -> Option<GitInfo> {
        match (&self.owner, &self.repo) {
            (Some(owner), Some(repo)) => Some(GitInfo {
                owner: owner.clone(),
                repo: repo.clone(),
                git_ref: self.git_ref.clone(),
            }),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DevServerConfig::default(),
    };
    cli.apply(&mut config);

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "helix-dev-server starting");

    if config.proxy.origin.is_none() {
        config.proxy.origin = origin_from(&StaticGitMetadata(cli.git_info()));
    }
    match &config.proxy.origin {
        Some(origin) => tracing::info!(origin = %origin, "Proxying to origin"),
        None => tracing::warn!("No origin configured; only local files are served"),
    }

    if let Some(address) = &config.observability.metrics_address {
        match address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let personality: Arc<dyn Personality> = if cli.import {
        Arc::new(ImportPersonality::new())
    } else {
        Arc::new(PreviewPersonality::new())
    };

    let server = DevServer::new(config, personality)?;
    server.start().await?;
    if let Some(url) = server.url() {
        tracing::info!(url = %url, "Ready");
    }

    let _config_watcher = cli
        .config
        .as_deref()
        .and_then(|path| watch_config(path, &server));

    tokio::select! {
        _ = terminate_signal() => server.stop().await,
        _ = server.stopped() => {}
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Report config file edits. Broken edits are pushed to browsers as alerts.
fn watch_config(path: &Path, server: &DevServer) -> Option<RecommendedWatcher> {
    let (watcher, mut updates) = ConfigWatcher::new(path);
    let watcher = match watcher.run() {
        Ok(watcher) => watcher,
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "Config watcher unavailable");
            return None;
        }
    };

    let live_reload = server.live_reload();
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            match update {
                Ok(_) => tracing::info!("Configuration changed; restart to apply"),
                Err(e) => {
                    if let Some(live_reload) = &live_reload {
                        live_reload.alert(format!("Configuration error: {}", e));
                    }
                }
            }
        }
    });
    Some(watcher)
}
