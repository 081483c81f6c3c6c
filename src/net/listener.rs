//! Port negotiation.
//!
//! # Responsibilities
//! - Resolve the configured bind address
//! - Detect a previous instance holding the port
//! - Ask it to terminate through `GET /.kill` when configured to
//! - Poll until the port frees up or give up

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::ListenerConfig;

/// Pause between two "is the port free" probes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Probes when no kill request was sent.
pub const DEFAULT_RETRIES: u32 = 1;

/// Probes after asking the other instance to quit.
pub const RETRIES_AFTER_KILL: u32 = 10;

const KILL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to resolve bind address {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bind address {0} did not resolve to any socket address")]
    Unresolved(String),

    #[error("port {0} already in use")]
    PortInUse(u16),
}

/// Resolve `bind_address:port` to the first socket address.
pub async fn resolve_address(config: &ListenerConfig) -> Result<SocketAddr, ListenerError> {
    let target = (config.bind_address.as_str(), config.port);
    let mut addrs = tokio::net::lookup_host(target)
        .await
        .map_err(|source| ListenerError::Resolve {
            address: config.bind_address.clone(),
            source,
        })?;
    addrs
        .next()
        .ok_or_else(|| ListenerError::Unresolved(config.bind_address.clone()))
}

/// True when something else is listening on `addr`.
pub async fn is_port_in_use(addr: SocketAddr) -> bool {
    TcpListener::bind(addr).await.is_err()
}

/// Best-effort `GET /.kill` against whatever listens on `addr`.
pub async fn request_kill(scheme: &str, addr: SocketAddr) {
    let target = loopback_for(addr);
    let url = format!("{}://{}/.kill", scheme, target);
    let client = match reqwest::Client::builder()
        .timeout(KILL_TIMEOUT)
        .danger_accept_invalid_certs(true)
        .no_proxy()
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Unable to build kill request client");
            return;
        }
    };
    match client.get(&url).send().await {
        Ok(response) => {
            tracing::info!(url = %url, status = %response.status(), "Asked previous instance to stop");
        }
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "Kill request failed");
        }
    }
}

/// Make sure `addr` can be bound, stopping a previous instance if allowed.
///
/// Port 0 always succeeds.
pub async fn negotiate_port(config: &ListenerConfig, addr: SocketAddr) -> Result<(), ListenerError> {
    if addr.port() == 0 {
        return Ok(());
    }

    let mut retries = DEFAULT_RETRIES;
    if config.kill_other && is_port_in_use(addr).await {
        tracing::info!(port = addr.port(), "Port in use, stopping previous instance");
        request_kill(config.scheme(), addr).await;
        retries = RETRIES_AFTER_KILL;
    }

    for attempt in 0..retries {
        if !is_port_in_use(addr).await {
            return Ok(());
        }
        tracing::debug!(port = addr.port(), attempt, "Port still in use");
        if attempt + 1 < retries {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    Err(ListenerError::PortInUse(addr.port()))
}

fn loopback_for(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port()),
        _ => addr,
    }
}
