//! Periodic liveness probing of cached origin connections.
//!
//! # Responsibilities
//! - Wake up once per interval, first sweep one interval after start
//! - Probe every origin client's cached connection concurrently
//! - Log and count failures; the client itself discards the connection

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::observability::metrics;
use crate::origin::{OriginPool, ProbeOutcome};

/// Tally of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub healthy: usize,
    pub unhealthy: usize,
    pub skipped: usize,
}

pub struct Prober {
    pool: Arc<OriginPool>,
    interval: Duration,
}

impl Prober {
    pub fn new(pool: Arc<OriginPool>, interval: Duration) -> Self {
        Self { pool, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Prober starting");

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        // A slow sweep pushes the next one back rather than bunching them up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    tracing::debug!(
                        healthy = report.healthy,
                        unhealthy = report.unhealthy,
                        skipped = report.skipped,
                        "Probe sweep finished"
                    );
                }
                _ = shutdown.recv() => {
                    tracing::info!("Prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every origin once.
    pub async fn sweep(&self) -> SweepReport {
        let probes = self.pool.clients().map(|client| async move {
            let outcome = client.probe().await;
            (client.route().domain(), outcome)
        });

        let mut report = SweepReport::default();
        for (domain, outcome) in join_all(probes).await {
            metrics::record_probe(domain, outcome.as_str());
            match outcome {
                ProbeOutcome::Healthy => report.healthy += 1,
                ProbeOutcome::Skipped => report.skipped += 1,
                ProbeOutcome::Unhealthy(e) => {
                    tracing::warn!(domain, error = %e, "Origin connection failed probe, discarded");
                    report.unhealthy += 1;
                }
            }
        }
        report
    }
}
