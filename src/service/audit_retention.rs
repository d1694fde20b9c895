//! Scheduled audit-trail retention.

use crate::error::AppResult;
use crate::store::{AuditCleanupSummary, Store};
use chrono::{Months, Utc};
use std::sync::Arc;
use tracing::info;

pub struct AuditRetentionService {
    store: Arc<dyn Store>,
    retention_months: u32,
}

impl AuditRetentionService {
    pub fn new(store: Arc<dyn Store>, retention_months: u32) -> Self {
        Self {
            store,
            retention_months,
        }
    }

    /// Deletes audit data older than the retention window. Safe to run
    /// repeatedly and unsupervised: a pass that deletes nothing is a no-op,
    /// and masters that still have recent details survive with their
    /// timestamp pulled forward.
    pub async fn cleanup(&self) -> AppResult<AuditCleanupSummary> {
        // An unrepresentable cutoff keeps everything rather than purging.
        let cutoff = Utc::now()
            .checked_sub_months(Months::new(self.retention_months))
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        info!(
            retention_months = self.retention_months,
            cutoff = %cutoff,
            "starting audit retention cleanup"
        );
        let summary = self.store.cleanup_audit(cutoff).await?;
        Ok(summary)
    }
}
