//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dev server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the development server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DevServerConfig {
    /// Listener configuration (bind address, port, TLS).
    pub listener: ListenerConfig,

    /// Local project settings.
    pub project: ProjectConfig,

    /// Origin proxy settings.
    pub proxy: ProxyConfig,

    /// On-disk response cache.
    pub cache: CacheConfig,

    /// Live-reload settings.
    pub live_reload: LiveReloadConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1").
    pub bind_address: String,

    /// Port to listen on. `0` picks an ephemeral port.
    pub port: u16,

    /// Optional TLS configuration. Serves HTTPS when set.
    pub tls: Option<TlsConfig>,

    /// Ask a previous instance occupying the port to terminate.
    pub kill_other: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 3000,
            tls: None,
            kill_other: false,
        }
    }
}

impl ListenerConfig {
    /// URL scheme served by this listener.
    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Local project layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project root. Local files are served from here.
    pub directory: PathBuf,

    /// Page served for HTML 404s, relative to the project root.
    pub not_found_page: Option<String>,

    /// Locally edited head fragment, relative to the project root.
    pub head_html: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            not_found_page: Some("404.html".to_string()),
            head_html: "head.html".to_string(),
        }
    }
}

/// Origin proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Origin base URL (e.g., "https://main--site--owner.hlx.page").
    pub origin: Option<String>,

    /// Skip TLS certificate verification against the origin.
    pub allow_insecure: bool,

    /// Forward all browser cookies instead of only the auth cookie.
    pub forward_cookies: bool,

    /// Name of the single cookie forwarded when `forward_cookies` is off.
    pub auth_cookie: String,

    /// Token sent as `authorization: token <value>` to the origin.
    pub site_token: Option<String>,

    /// Path the browser is redirected to on 401/403 navigations.
    pub auto_login_path: Option<String>,

    /// Honor `HTTP_PROXY`/`HTTPS_PROXY` for origin requests.
    pub use_env_proxy: bool,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum forwarded request body size in bytes.
    pub max_body_size: usize,

    /// Inject live-reload and merge head into proxied HTML.
    pub head_merge: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            origin: None,
            allow_insecure: false,
            forward_cookies: false,
            auth_cookie: "hlx-auth-token".to_string(),
            site_token: None,
            auto_login_path: None,
            use_env_proxy: true,
            timeout_secs: 30,
            max_body_size: 10 * 1024 * 1024, // 10MB
            head_merge: true,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root. Caching is disabled when unset.
    pub directory: Option<PathBuf>,
}

/// Live-reload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Enable live reload.
    pub enabled: bool,

    /// Window in milliseconds used to coalesce file changes.
    pub debounce_ms: u64,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 100,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prometheus endpoint bind address. Disabled when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: DevServerConfig = toml::from_str(
            r#"
            [listener]
            port = 3001

            [proxy]
            origin = "https://main--site--owner.hlx.page"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.port, 3001);
        assert_eq!(config.listener.bind_address, "127.0.0.1");
        assert_eq!(config.proxy.auth_cookie, "hlx-auth-token");
        assert!(config.live_reload.enabled);
        assert_eq!(config.live_reload.debounce_ms, 100);
        assert!(config.cache.directory.is_none());
    }

    #[test]
    fn scheme_follows_tls() {
        let mut listener = ListenerConfig::default();
        assert_eq!(listener.scheme(), "http");
        listener.tls = Some(TlsConfig {
            cert_path: "cert.pem".into(),
            key_path: "key.pem".into(),
        });
        assert_eq!(listener.scheme(), "https");
    }
}
