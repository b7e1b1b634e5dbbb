//! Edge gateway entrypoint.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request        ┌───────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ net (plain / TLS) ─▶ http server            │
//!                           │                          │                    │
//!                           │                          ▼                    │
//!                           │                   forwarder ─▶ route table    │
//!                           │                          │                    │
//!                           │                          ▼                    │
//!     Client Response       │                   origin client ─(HTTP/2)─────┼──▶ Origin
//!     ◀─────────────────────┼── response repair ◀──────┘        ▲           │
//!                           │                                   │           │
//!                           │                prober (every 60s) ┘           │
//!                           └───────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use edge_gateway::config::{parse_bind, Cli, GatewayConfig};
use edge_gateway::lifecycle::signals::wait_for_signal;
use edge_gateway::observability::{logging, metrics};
use edge_gateway::{EdgeServer, OriginPool, Prober, Shutdown};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("edge-gateway: {}", e);
            return ExitCode::from(2);
        }
    };

    logging::init(&config.observability.log_level);

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    if let Some(addr) = config.observability.metrics_address.as_deref() {
        if let Some(addr) = parse_bind(addr)? {
            metrics::init_metrics(addr)?;
        }
    }

    let pool = Arc::new(OriginPool::from_config(&config)?);
    for route in pool.routes().iter() {
        tracing::info!(domain = %route.domain(), origin = %route.origin_host(), "Proxying domain to origin");
    }

    let shutdown = Shutdown::new();

    if config.prober.enabled {
        let prober = Prober::new(Arc::clone(&pool), config.prober.interval());
        tokio::spawn(prober.run(shutdown.subscribe()));
    } else {
        tracing::info!("Connection prober disabled");
    }

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.trigger();
    });

    let server = EdgeServer::new(&config, pool)?;
    server.run(&shutdown).await?;

    // Listeners are done; make sure the prober stops too.
    shutdown.trigger();
    Ok(())
}
