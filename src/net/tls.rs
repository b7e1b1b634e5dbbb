//! TLS configuration and certificate loading for the encrypted listener.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

use crate::config::{ConfigError, TlsConfig};

/// Load the listener certificate and key.
///
/// `RustlsConfig` advertises `h2` and `http/1.1` via ALPN.
pub async fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, ConfigError> {
    let cert_path = Path::new(&config.cert_path);
    let key_path = Path::new(&config.key_path);

    if !cert_path.exists() {
        return Err(ConfigError::Tls(format!("certificate file not found: {}", cert_path.display())));
    }
    if !key_path.exists() {
        return Err(ConfigError::Tls(format!("private key file not found: {}", key_path.display())));
    }

    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| ConfigError::Tls(format!("failed to load {}: {}", cert_path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_certificate() {
        let config = TlsConfig {
            cert_path: "/nonexistent/server.crt".into(),
            key_path: "/nonexistent/server.key".into(),
        };
        let err = load_tls_config(&config).await.unwrap_err();
        assert!(err.to_string().contains("certificate file not found"));
    }
}
