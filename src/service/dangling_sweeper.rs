//! Sweep for dangling payments.
//!
//! A payment that has an external id, was submitted longer ago than the
//! threshold and is still non-terminal has fallen out of the normal webhook
//! or redirect flow. The sweep asks the provider for its real status and
//! reconciles. It never fabricates a terminal state: if the provider cannot
//! answer, the payment simply stays a candidate for the next pass.

use crate::error::AppResult;
use crate::events::EventBus;
use crate::gateway::ProviderGateway;
use crate::service::reconcile_status::{Outcome, ReconcileStatusService};
use crate::store::Store;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Minutes a submitted payment may stay non-terminal before it counts
    /// as dangling.
    pub threshold_minutes: i64,
    /// Seconds between passes of the periodic loop.
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            threshold_minutes: 90,
            interval_secs: 300,
        }
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub scanned: usize,
    pub resolved: usize,
    pub still_dangling: usize,
    pub failures: usize,
}

pub struct DanglingPaymentSweeper {
    store: Arc<dyn Store>,
    reconciler: ReconcileStatusService,
    config: SweeperConfig,
}

impl DanglingPaymentSweeper {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn ProviderGateway>,
        events: EventBus,
        config: SweeperConfig,
    ) -> Self {
        let reconciler = ReconcileStatusService::new(Arc::clone(&store), gateway, events);
        Self {
            store,
            reconciler,
            config,
        }
    }

    /// One pass over every currently dangling payment.
    pub async fn sweep_once(&self) -> AppResult<SweepSummary> {
        let cutoff = Utc::now() - Duration::minutes(self.config.threshold_minutes);
        let dangling = self.store.find_dangling_payments(cutoff).await?;

        let mut summary = SweepSummary {
            scanned: dangling.len(),
            ..SweepSummary::default()
        };

        for payment in dangling {
            let payment_id = payment.id_or_panic();
            match self.reconciler.reconcile(payment_id).await {
                Ok(Outcome::Updated { status }) if status.is_terminal() => {
                    summary.resolved += 1;
                }
                Ok(_) => {
                    summary.still_dangling += 1;
                }
                Err(err) if err.is_retryable() => {
                    // Unknown outcome: leave the payment for the next pass.
                    warn!(payment_id = %payment_id, error = %err, "dangling payment not resolved");
                    summary.failures += 1;
                }
                Err(err) => {
                    error!(payment_id = %payment_id, error = %err, "dangling payment reconciliation failed");
                    summary.failures += 1;
                }
            }
        }

        info!(
            scanned = summary.scanned,
            resolved = summary.resolved,
            still_dangling = summary.still_dangling,
            failures = summary.failures,
            "dangling payment sweep completed"
        );
        Ok(summary)
    }

    /// Periodic loop for embedders that want an in-process trigger. One bad
    /// pass is logged, never propagated; the loop stops on shutdown.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            threshold_minutes = self.config.threshold_minutes,
            interval_secs = self.config.interval_secs,
            "dangling payment sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("dangling payment sweeper stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(std::time::Duration::from_secs(self.config.interval_secs)) => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "sweep pass failed");
                    }
                }
            }
        }

        info!("dangling payment sweeper stopped");
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        self.sweep_once().await?;
        Ok(())
    }
}
