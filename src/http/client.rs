//! Origin fetch clients.
//!
//! The server owns one [`FetchContext`] holding a verifying client and, on
//! demand, one that skips certificate checks. Both never follow redirects;
//! redirects are relayed to the browser instead.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::{redirect, Client};

/// Settings shared by every client built by the context.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub use_env_proxy: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            use_env_proxy: true,
        }
    }
}

#[derive(Default)]
struct Clients {
    default: Option<Client>,
    insecure: Option<Client>,
}

/// Lazily built HTTP clients, keyed by "insecure" vs "default".
pub struct FetchContext {
    options: FetchOptions,
    clients: Mutex<Clients>,
}

impl FetchContext {
    pub fn new(options: FetchOptions) -> Self {
        Self {
            options,
            clients: Mutex::new(Clients::default()),
        }
    }

    /// Get (building if needed) the client for the requested TLS mode.
    pub fn client(&self, allow_insecure: bool) -> Result<Client, reqwest::Error> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        let slot = if allow_insecure {
            &mut clients.insecure
        } else {
            &mut clients.default
        };
        if let Some(client) = slot {
            return Ok(client.clone());
        }
        let client = self.build(allow_insecure)?;
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Drop all clients and their connection pools.
    pub fn reset(&self) {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        *clients = Clients::default();
        tracing::debug!("Fetch context reset");
    }

    fn build(&self, allow_insecure: bool) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(self.options.timeout)
            .danger_accept_invalid_certs(allow_insecure)
            .gzip(true)
            .brotli(true)
            .deflate(true);
        if !self.options.use_env_proxy {
            builder = builder.no_proxy();
        }
        builder.build()
    }
}

impl Default for FetchContext {
    fn default() -> Self {
        Self::new(FetchOptions::default())
    }
}
