//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the project directory exists
//! - Validate value ranges (debounce > 0, address parses)
//! - Check origin URL and TLS file presence
//!
//! Returns all validation errors, not just the first.

use std::net::IpAddr;

use url::Url;

use crate::config::schema::DevServerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address: {0}")]
    BindAddress(String),

    #[error("project directory does not exist: {0}")]
    MissingProjectDirectory(String),

    #[error("invalid origin url '{url}': {reason}")]
    Origin { url: String, reason: String },

    #[error("TLS {kind} file not found: {path}")]
    MissingTlsFile { kind: &'static str, path: String },

    #[error("live_reload.debounce_ms must be greater than zero")]
    ZeroDebounce,

    #[error("proxy.timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("auto login path must start with '/': {0}")]
    AutoLoginPath(String),
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &DevServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let bind = config.listener.bind_address.as_str();
    if bind != "localhost" && bind.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::BindAddress(bind.to_string()));
    }

    if !config.project.directory.is_dir() {
        errors.push(ValidationError::MissingProjectDirectory(
            config.project.directory.display().to_string(),
        ));
    }

    if let Some(origin) = &config.proxy.origin {
        if let Err(reason) = check_origin(origin) {
            errors.push(ValidationError::Origin {
                url: origin.clone(),
                reason,
            });
        }
    }

    if let Some(tls) = &config.listener.tls {
        if !tls.cert_path.exists() {
            errors.push(ValidationError::MissingTlsFile {
                kind: "certificate",
                path: tls.cert_path.display().to_string(),
            });
        }
        if !tls.key_path.exists() {
            errors.push(ValidationError::MissingTlsFile {
                kind: "key",
                path: tls.key_path.display().to_string(),
            });
        }
    }

    if config.live_reload.debounce_ms == 0 {
        errors.push(ValidationError::ZeroDebounce);
    }

    if config.proxy.timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if let Some(path) = &config.proxy.auto_login_path {
        if !path.starts_with('/') {
            errors.push(ValidationError::AutoLoginPath(path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_origin(origin: &str) -> Result<(), String> {
    let url = Url::parse(origin).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{}'", other)),
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;

    fn valid_config(dir: &std::path::Path) -> DevServerConfig {
        let mut config = DevServerConfig::default();
        config.project.directory = dir.to_path_buf();
        config.proxy.origin = Some("https://main--site--owner.hlx.page".to_string());
        config
    }

    #[test]
    fn accepts_defaults_with_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_config(&valid_config(dir.path())).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.project.directory = dir.path().join("missing");
        config.proxy.origin = Some("ftp://example.com".to_string());
        config.live_reload.debounce_ms = 0;
        config.listener.bind_address = "not an address".to_string();
        config.listener.tls = Some(TlsConfig {
            cert_path: dir.path().join("cert.pem"),
            key_path: dir.path().join("key.pem"),
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::ZeroDebounce));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::MissingProjectDirectory(_))));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::Origin { .. })));
    }

    #[test]
    fn rejects_relative_auto_login_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.proxy.auto_login_path = Some("login".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::AutoLoginPath("login".to_string())]);
    }
}
