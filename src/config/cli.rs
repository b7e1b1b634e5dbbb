//! Command line interface.
//!
//! Flags mirror the classic gateway invocation
//! (`edge-gateway --bind :8000 --sslbind :44300 www.example.com:10.0.0.5`)
//! and override values from an optional TOML file.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{read_config, ConfigError};
use crate::config::schema::GatewayConfig;
use crate::config::validation::validate_config;

#[derive(Debug, Parser)]
#[command(name = "edge-gateway")]
#[command(version, about = "Domain-based reverse-proxy gateway", long_about = None)]
pub struct Cli {
    /// TOML configuration file; flags below override it
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Bind address for HTTP ("" disables)
    #[arg(long)]
    pub bind: Option<String>,

    /// Bind address for HTTPS ("" disables)
    #[arg(long)]
    pub sslbind: Option<String>,

    /// TLS certificate (PEM)
    #[arg(long)]
    pub cert: Option<String>,

    /// TLS private key (PEM)
    #[arg(long)]
    pub key: Option<String>,

    /// Probe cached origin connections to keep them alive
    #[arg(long, value_name = "BOOL")]
    pub keepalive: Option<bool>,

    /// Secret token sent to origins to authenticate the source IP
    #[arg(long)]
    pub secret: Option<String>,

    /// Talk to origins without TLS
    #[arg(long)]
    pub origin_plaintext: bool,

    /// Reach origins over pooled HTTP/1.1 instead of one HTTP/2 connection
    #[arg(long)]
    pub no_upgraded_client: bool,

    /// Extra CA certificates (PEM) trusted for origins
    #[arg(long, value_name = "FILE")]
    pub origin_ca: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long, value_name = "ADDR")]
    pub metrics_bind: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    pub log_level: Option<String>,

    /// Routes as domain:origin-host
    #[arg(value_name = "DOMAIN:ORIGIN")]
    pub routes: Vec<String>,
}

impl Cli {
    /// Resolve the final, validated configuration.
    pub fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => GatewayConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply(self, config: &mut GatewayConfig) {
        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(sslbind) = self.sslbind {
            config.listener.tls_bind_address = sslbind;
        }
        if let Some(cert) = self.cert {
            config.listener.tls.cert_path = cert;
        }
        if let Some(key) = self.key {
            config.listener.tls.key_path = key;
        }
        if let Some(keepalive) = self.keepalive {
            config.prober.enabled = keepalive;
        }
        if let Some(secret) = self.secret {
            config.secret = secret;
        }
        if self.origin_plaintext {
            config.origin.plaintext = true;
        }
        if self.no_upgraded_client {
            config.origin.upgrade = false;
        }
        if let Some(ca) = self.origin_ca {
            config.origin.ca_path = Some(ca);
        }
        if let Some(addr) = self.metrics_bind {
            config.observability.metrics_address = Some(addr);
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        config.routes.extend(self.routes);
    }
}
