use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{VerifierBuilderError, WebPkiClientVerifier};
use rustls::{RootCertStore, ServerConfig};
use thiserror::Error;

use crate::config::ServerTlsConfig;

/// Errors that can occur while preparing the HTTPS listener.
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No certificates found in {}", .0.display())]
    NoCertificates(PathBuf),

    #[error("No private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),

    #[error("Client certificate verification requires a CA bundle (--tls-cacert-file)")]
    MissingClientCa,

    #[error("Client verifier error: {0}")]
    Verifier(#[from] VerifierBuilderError),

    #[error("TLS error: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Build the rustls server configuration for the review listener.
///
/// With a CA bundle, client certificates signed by it are verified when
/// presented. `require_and_verify_client_cert` additionally rejects clients
/// that present none.
pub fn server_config(config: &ServerTlsConfig) -> Result<ServerConfig, TlsError> {
    if config.require_and_verify_client_cert && config.cacert_file.is_none() {
        return Err(TlsError::MissingClientCa);
    }

    let certs = load_certs(&config.cert_file)?;
    let key = load_key(&config.key_file)?;

    let provider = Arc::new(ring::default_provider());
    let builder =
        ServerConfig::builder_with_provider(provider.clone()).with_safe_default_protocol_versions()?;

    let builder = match &config.cacert_file {
        Some(path) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(path)? {
                roots.add(cert)?;
            }

            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider);
            let verifier = if config.require_and_verify_client_cert {
                verifier.build()?
            } else {
                verifier.allow_unauthenticated().build()?
            };
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut server = builder.with_single_cert(certs, key)?;
    server.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(server)
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path).map(BufReader::new).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures/tls")
            .join(name)
    }

    fn fixture_config() -> ServerTlsConfig {
        ServerTlsConfig {
            enabled: true,
            cert_file: fixture("server.crt"),
            key_file: fixture("server.key"),
            ..Default::default()
        }
    }

    #[test]
    fn test_server_config_from_pem_files() {
        let config = server_config(&fixture_config()).unwrap();
        assert!(config.alpn_protocols.contains(&b"http/1.1".to_vec()));
    }

    #[test]
    fn test_client_verification() {
        let optional = ServerTlsConfig {
            cacert_file: Some(fixture("ca.crt")),
            ..fixture_config()
        };
        assert!(server_config(&optional).is_ok());

        let required = ServerTlsConfig {
            require_and_verify_client_cert: true,
            ..optional
        };
        assert!(server_config(&required).is_ok());
    }

    #[test]
    fn test_required_client_cert_needs_ca() {
        let config = ServerTlsConfig {
            require_and_verify_client_cert: true,
            ..fixture_config()
        };

        assert!(matches!(server_config(&config), Err(TlsError::MissingClientCa)));
    }

    #[test]
    fn test_missing_cert_file() {
        let config = ServerTlsConfig {
            cert_file: PathBuf::from("/nonexistent/cert.pem"),
            ..fixture_config()
        };

        let err = server_config(&config).err().unwrap();
        assert!(matches!(err, TlsError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/cert.pem"));
    }

    #[test]
    fn test_key_file_without_key() {
        let mut empty = NamedTempFile::new().unwrap();
        writeln!(empty, "not a key").unwrap();

        let config = ServerTlsConfig {
            key_file: empty.path().to_path_buf(),
            ..fixture_config()
        };

        assert!(matches!(server_config(&config), Err(TlsError::NoPrivateKey(_))));
    }

    #[test]
    fn test_cert_file_without_certs() {
        let config = ServerTlsConfig {
            cert_file: fixture("server.key"),
            ..fixture_config()
        };

        assert!(matches!(server_config(&config), Err(TlsError::NoCertificates(_))));
    }
}
