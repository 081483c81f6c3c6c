//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {0:?}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS configuration: {0}")]
    Config(#[source] std::io::Error),
}

/// Check that `cert_path` holds at least one certificate and `key_path` a key.
pub fn validate_pem_files(cert_path: &Path, key_path: &Path) -> Result<(), TlsError> {
    let mut certs = reader(cert_path)?;
    let mut found = 0usize;
    for cert in rustls_pemfile::certs(&mut certs) {
        cert.map_err(|source| TlsError::Io {
            path: cert_path.to_path_buf(),
            source,
        })?;
        found += 1;
    }
    if found == 0 {
        return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
    }

    let mut keys = reader(key_path)?;
    match rustls_pemfile::private_key(&mut keys) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(TlsError::NoPrivateKey(key_path.to_path_buf())),
        Err(source) => Err(TlsError::Io {
            path: key_path.to_path_buf(),
            source,
        }),
    }
}

/// Validate and load TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    validate_pem_files(cert_path, key_path)?;
    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(TlsError::Config)
}

fn reader(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_are_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_pem_files(&dir.path().join("cert.pem"), &dir.path().join("key.pem")).unwrap_err();
        assert!(matches!(err, TlsError::Io { .. }));
    }

    #[test]
    fn files_without_pem_blocks_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "not a certificate").unwrap();
        std::fs::write(&key, "not a key").unwrap();
        let err = validate_pem_files(&cert, &key).unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates(p) if p == cert));
    }
}
