use std::sync::Arc;
use std::time::Duration;

use sitesync_protocol::{
    DeletionEntry, PendingEntry, ReconciliationApi, ReportDeletionRequest, ReportRequest,
};
use sitesync_types::SiteId;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::HttpReconciliationClient;
use crate::config::AgentConfig;
use crate::error::AgentResult;
use crate::issuer::{self, ApplyRequest, IssuerClient};

/// Tally of one reconciliation cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub applied: usize,
    pub apply_failed: usize,
    pub revoked: usize,
    pub revoke_failed: usize,
    /// Items the registry no longer tracks; forgotten, not retried.
    pub dropped: usize,
    /// Reports that could not be delivered; the row stays as it was.
    pub report_errors: usize,
    pub poll_errors: usize,
    /// Shutdown was requested before every polled item was handled.
    pub interrupted: bool,
}

impl CycleReport {
    pub fn handled(&self) -> usize {
        self.applied + self.apply_failed + self.revoked + self.revoke_failed
    }
}

/// The reconciliation loop for one site.
pub struct SiteAgent {
    site_id: SiteId,
    site_name: String,
    api: Arc<dyn ReconciliationApi>,
    issuer: Arc<dyn IssuerClient>,
    interval: Duration,
    max_entries: u32,
}

impl SiteAgent {
    pub fn new(
        config: &AgentConfig,
        api: Arc<dyn ReconciliationApi>,
        issuer: Arc<dyn IssuerClient>,
    ) -> Self {
        Self {
            site_id: config.site(),
            site_name: config.display_name().to_string(),
            api,
            issuer,
            interval: config.sync_interval(),
            max_entries: config.max_entries,
        }
    }

    /// An agent talking HTTP to the registry and driving the configured
    /// issuer.
    pub fn from_config(config: &AgentConfig) -> AgentResult<Self> {
        config.validate()?;
        let api = Arc::new(HttpReconciliationClient::new(
            config.base_url(),
            config.request_timeout(),
        ));
        Ok(Self::new(config, api, issuer::from_config(&config.issuer)))
    }

    pub fn site_id(&self) -> &SiteId {
        &self.site_id
    }

    /// Run one cycle now, then one per interval, until `shutdown` turns
    /// `true` or its sender is dropped. Returns the number of cycles run.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> AgentResult<u64> {
        info!(
            site_id = %self.site_id,
            site_name = %self.site_name,
            interval_secs = self.interval.as_secs(),
            max_entries = self.max_entries,
            "site agent started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0u64;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let report = self.run_cycle(&shutdown).await;
            cycles += 1;
            if report.interrupted {
                break;
            }
        }

        info!(site_id = %self.site_id, cycles, "site agent stopped");
        Ok(cycles)
    }

    /// One pass: pending entries first, then deletions.
    ///
    /// Shutdown is checked between items; an item whose issuer call has
    /// started is always reported first.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> CycleReport {
        info!(site_id = %self.site_id, "sync cycle started");
        let mut report = CycleReport::default();

        match self.api.poll(&self.site_id, self.max_entries).await {
            Ok(entries) => {
                if !entries.is_empty() {
                    info!(site_id = %self.site_id, count = entries.len(), "pending entries to sync");
                }
                for entry in &entries {
                    if *shutdown.borrow() {
                        report.interrupted = true;
                        return self.finish(report);
                    }
                    self.sync_entry(entry, &mut report).await;
                }
            }
            Err(e) => {
                warn!(site_id = %self.site_id, error = %e, "failed to poll pending entries");
                report.poll_errors += 1;
            }
        }

        match self.api.poll_deletions(&self.site_id, self.max_entries).await {
            Ok(entries) => {
                if !entries.is_empty() {
                    info!(site_id = %self.site_id, count = entries.len(), "entries to delete");
                }
                for entry in &entries {
                    if *shutdown.borrow() {
                        report.interrupted = true;
                        return self.finish(report);
                    }
                    self.delete_entry(entry, &mut report).await;
                }
            }
            Err(e) => {
                warn!(site_id = %self.site_id, error = %e, "failed to poll deletions");
                report.poll_errors += 1;
            }
        }

        self.finish(report)
    }

    fn finish(&self, report: CycleReport) -> CycleReport {
        info!(
            site_id = %self.site_id,
            applied = report.applied,
            apply_failed = report.apply_failed,
            revoked = report.revoked,
            revoke_failed = report.revoke_failed,
            dropped = report.dropped,
            interrupted = report.interrupted,
            "sync cycle complete"
        );
        report
    }

    async fn sync_entry(&self, entry: &PendingEntry, report: &mut CycleReport) {
        let entry_id = entry.workload_entry_id.clone();
        debug!(site_id = %self.site_id, entry_id = %entry_id, spiffe_id = %entry.spiffe_id, "syncing entry");

        let outcome = match self.issuer.apply(&ApplyRequest::from(entry)).await {
            Ok(issuer_entry_id) => {
                debug!(site_id = %self.site_id, entry_id = %entry_id, issuer_entry_id = %issuer_entry_id, "entry applied");
                report.applied += 1;
                ReportRequest::applied(self.site_id.clone(), entry_id.clone(), issuer_entry_id)
            }
            Err(e) => {
                warn!(site_id = %self.site_id, entry_id = %entry_id, error = %e, "failed to apply entry");
                report.apply_failed += 1;
                ReportRequest::failed(self.site_id.clone(), entry_id.clone(), e.to_string())
            }
        };

        match self.api.report(outcome).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!(site_id = %self.site_id, entry_id = %entry_id, "entry no longer assigned, dropping");
                report.dropped += 1;
            }
            Err(e) => {
                warn!(site_id = %self.site_id, entry_id = %entry_id, error = %e, "failed to report sync result");
                report.report_errors += 1;
            }
        }
    }

    async fn delete_entry(&self, entry: &DeletionEntry, report: &mut CycleReport) {
        let entry_id = entry.workload_entry_id.clone();
        debug!(site_id = %self.site_id, entry_id = %entry_id, issuer_entry_id = %entry.spire_entry_id, "revoking entry");

        let outcome = match self.issuer.revoke(&entry.spire_entry_id).await {
            Ok(()) => {
                report.revoked += 1;
                ReportDeletionRequest::revoked(self.site_id.clone(), entry_id.clone())
            }
            Err(e) => {
                warn!(site_id = %self.site_id, entry_id = %entry_id, error = %e, "failed to revoke entry");
                report.revoke_failed += 1;
                ReportDeletionRequest::failed(self.site_id.clone(), entry_id.clone(), e.to_string())
            }
        };

        match self.api.report_deletion(outcome).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!(site_id = %self.site_id, entry_id = %entry_id, "deletion already settled, dropping");
                report.dropped += 1;
            }
            Err(e) => {
                warn!(site_id = %self.site_id, entry_id = %entry_id, error = %e, "failed to report deletion result");
                report.report_errors += 1;
            }
        }
    }
}

impl std::fmt::Debug for SiteAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteAgent")
            .field("site_id", &self.site_id)
            .field("interval", &self.interval)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}
