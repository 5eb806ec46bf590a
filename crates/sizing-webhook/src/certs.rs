use std::{path::Path, sync::Arc};

use ::tracing::warn;
use anyhow::{Context, Result, anyhow};
use axum_server::tls_rustls::RustlsConfig;
use rustls::ServerConfig;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, pem::SliceIter};

use crate::config::TlsConfig;

/// Build the TLS configuration of the webhook server from the PEM files
/// referenced by `tls_config`.
pub(crate) async fn create_tls_config(tls_config: &TlsConfig) -> Result<RustlsConfig> {
    let (cert, key) = load_server_cert_and_key(&tls_config.cert_file, &tls_config.key_file).await?;
    let server_config = build_tls_server_config(cert, key)?;

    Ok(RustlsConfig::from_config(Arc::new(server_config)))
}

fn build_tls_server_config(
    cert: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    Ok(ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(cert, key)?)
}

// Load the server certificate chain and key
async fn load_server_cert_and_key(
    cert_file: &Path,
    key_file: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert_contents = tokio::fs::read(cert_file)
        .await
        .with_context(|| format!("cannot read certificate file {}", cert_file.display()))?;
    let key_contents = tokio::fs::read(key_file)
        .await
        .with_context(|| format!("cannot read key file {}", key_file.display()))?;

    let cert_iterator: SliceIter<CertificateDer> = SliceIter::new(&cert_contents[..]);
    let certs: Vec<_> = cert_iterator
        .filter_map(|it| {
            if let Err(ref e) = it {
                warn!("Cannot parse certificate: {e}");
            }
            it.ok()
        })
        .collect();

    if certs.is_empty() {
        return Err(anyhow!(
            "No certificate found in certificate file {}",
            cert_file.display()
        ));
    }

    let key_iterator: SliceIter<PrivateKeyDer> = SliceIter::new(&key_contents[..]);
    let mut keys: Vec<PrivateKeyDer> = key_iterator
        .filter_map(|it| {
            if let Err(ref e) = it {
                warn!("Cannot parse private key: {e}");
            }
            it.ok()
        })
        .collect();

    if keys.len() != 1 {
        return Err(anyhow!(
            "Expected exactly one key in key file, found {}",
            keys.len()
        ));
    }

    Ok((certs, keys.remove(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertifiedKey, generate_simple_self_signed};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_tls_files(dir: &TempDir, cert: &str, key: &str) -> TlsConfig {
        let cert_file = dir.path().join("webhook.pem");
        let key_file = dir.path().join("webhook-key.pem");
        std::fs::write(&cert_file, cert).unwrap();
        std::fs::write(&key_file, key).unwrap();

        TlsConfig {
            cert_file,
            key_file,
        }
    }

    #[tokio::test]
    async fn load_self_signed_certificate() {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["sizing-webhook.default.svc".to_owned()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let tls_config = write_tls_files(&dir, &cert.pem(), &key_pair.serialize_pem());

        assert!(create_tls_config(&tls_config).await.is_ok());
    }

    #[tokio::test]
    async fn missing_files_are_an_error() {
        let tls_config = TlsConfig {
            cert_file: PathBuf::from("/does/not/exist/cert.pem"),
            key_file: PathBuf::from("/does/not/exist/key.pem"),
        };

        let err = create_tls_config(&tls_config).await.unwrap_err();
        assert!(err.to_string().contains("cannot read certificate file"));
    }

    #[tokio::test]
    async fn empty_certificate_is_an_error() {
        let CertifiedKey { key_pair, .. } =
            generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let tls_config = write_tls_files(&dir, "", &key_pair.serialize_pem());

        let err = create_tls_config(&tls_config).await.unwrap_err();
        assert!(err.to_string().contains("No certificate found"));
    }

    #[tokio::test]
    async fn missing_key_is_an_error() {
        let CertifiedKey { cert, .. } =
            generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let tls_config = write_tls_files(&dir, &cert.pem(), "");

        let err = create_tls_config(&tls_config).await.unwrap_err();
        assert!(err.to_string().contains("Expected exactly one key"));
    }
}
