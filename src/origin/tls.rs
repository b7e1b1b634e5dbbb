//! Client-side TLS for origin connections.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::config::ConfigError;

/// ALPN identifier of the upgraded transport.
pub const ALPN_H2: &[u8] = b"h2";

/// Build the TLS connector used by the upgraded transport.
///
/// Only `h2` is offered via ALPN.
pub fn connector(extra_ca: Option<&Path>) -> Result<TlsConnector, ConfigError> {
    let mut config = client_config(extra_ca)?;
    config.alpn_protocols = vec![ALPN_H2.to_vec()];
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Client TLS settings trusting the webpki roots plus any certificates
/// found in `extra_ca`. No ALPN protocols are set.
pub fn client_config(extra_ca: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = extra_ca {
        let added = add_pem_roots(&mut roots, path)?;
        tracing::info!(path = %path.display(), certificates = added, "Loaded extra origin trust roots");
    }

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ConfigError::Tls(format!("origin TLS setup: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(config)
}

fn add_pem_roots(roots: &mut RootCertStore, path: &Path) -> Result<usize, ConfigError> {
    let file = File::open(path)
        .map_err(|e| ConfigError::Tls(format!("failed to open CA file {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);

    let mut added = 0;
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| ConfigError::Tls(format!("failed to parse {}: {}", path.display(), e)))?;
        roots
            .add(cert)
            .map_err(|e| ConfigError::Tls(format!("rejected CA in {}: {}", path.display(), e)))?;
        added += 1;
    }

    if added == 0 {
        return Err(ConfigError::Tls(format!("no certificates found in {}", path.display())));
    }
    Ok(added)
}
