//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0:?}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TlsError + '_ {
    move |source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Check that the PEM files hold at least one certificate and a private key.
pub fn validate_pem_files(cert_path: &Path, key_path: &Path) -> Result<usize, TlsError> {
    let mut cert_reader = BufReader::new(File::open(cert_path).map_err(io_error(cert_path))?);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_error(cert_path))?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
    }

    let mut key_reader = BufReader::new(File::open(key_path).map_err(io_error(key_path))?);
    if rustls_pemfile::private_key(&mut key_reader)
        .map_err(io_error(key_path))?
        .is_none()
    {
        return Err(TlsError::NoPrivateKey(key_path.to_path_buf()));
    }

    Ok(certs.len())
}

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    let chain_len = validate_pem_files(cert_path, key_path)?;
    tracing::info!(cert = ?cert_path, chain_len, "Loading TLS certificate");

    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(io_error(cert_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file() {
        let err = validate_pem_files(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"))
            .unwrap_err();
        assert!(matches!(err, TlsError::Io { .. }));
    }

    #[test]
    fn test_file_without_certificates() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "not a pem file").unwrap();
        let key = tempfile::NamedTempFile::new().unwrap();

        let err = validate_pem_files(cert.path(), key.path()).unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates(_)));
    }
}
