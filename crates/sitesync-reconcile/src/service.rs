use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;
use sitesync_ledger::{Effect, LedgerError, LedgerRow, SyncLedger};
use sitesync_protocol::message::PollQuery;
use sitesync_protocol::{
    Acknowledged, ApiResult, DeletionEntry, PendingEntry, ReconciliationApi,
    ReportDeletionRequest, ReportRequest, DEFAULT_MAX_ENTRIES, MAX_ENTRIES_LIMIT,
};
use sitesync_registry::{NewAuditRecord, WorkloadRegistry};
use sitesync_types::{Actor, EntryId, ErrorKind, SiteId};
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, ReconcileResult};

/// How long a `failed` row rests before the poll path offers it again.
pub const DEFAULT_FAILED_RETRY_AFTER_SECS: u64 = 60;

const ACTION_SYNC: &str = "sync";
const ACTION_DELETE_SYNC: &str = "delete_sync";

/// Tunables of the poll path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub failed_retry_after_secs: u64,
    /// Batch size when an agent asks for 0 entries.
    pub default_poll_limit: u32,
    /// Ceiling on any batch.
    pub max_poll_limit: u32,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            failed_retry_after_secs: DEFAULT_FAILED_RETRY_AFTER_SECS,
            default_poll_limit: DEFAULT_MAX_ENTRIES,
            max_poll_limit: MAX_ENTRIES_LIMIT,
        }
    }
}

/// Agent-facing service over the registry's ledger.
#[derive(Clone, Debug)]
pub struct ReconciliationService {
    registry: WorkloadRegistry,
    settings: ReconcileSettings,
}

impl ReconciliationService {
    pub fn new(registry: WorkloadRegistry, settings: ReconcileSettings) -> Self {
        Self { registry, settings }
    }

    fn ledger(&self) -> &SyncLedger {
        self.registry.ledger()
    }

    fn limit(&self, query: &PollQuery) -> usize {
        query.effective_limit_within(
            self.settings.default_poll_limit,
            self.settings.max_poll_limit,
        )
    }

    /// `pending` rows first, then `failed` rows whose retry delay has passed,
    /// up to the effective limit.
    ///
    /// Rows whose entry definition is gone never reach the agent: they are
    /// run through the deletion cascade and the batch is refilled.
    pub fn poll_pending(&self, query: &PollQuery) -> ReconcileResult<Vec<PendingEntry>> {
        self.ensure_site(&query.site_id)?;
        let limit = self.limit(query);

        loop {
            let mut entries = Vec::with_capacity(limit);
            let mut purged = 0usize;
            for row in self.candidates(&query.site_id, limit)? {
                match self.registry.entry(&row.entry_id)? {
                    Some(entry) => entries.push(PendingEntry {
                        workload_entry_id: entry.id,
                        spiffe_id: entry.spiffe_id,
                        parent_id: entry.parent_id,
                        selectors: entry.selectors,
                        ttl: entry.ttl,
                    }),
                    None => {
                        warn!(
                            site_id = %row.site_id,
                            entry_id = %row.entry_id,
                            "ledger row has no entry definition, purging"
                        );
                        self.ledger().mark_entry_deleting(&row.entry_id)?;
                        purged += 1;
                    }
                }
            }
            // Each pass removes every orphan it saw, so this terminates.
            if purged == 0 || entries.len() == limit {
                debug!(site_id = %query.site_id, count = entries.len(), "polled pending entries");
                return Ok(entries);
            }
        }
    }

    fn candidates(&self, site_id: &SiteId, limit: usize) -> ReconcileResult<Vec<LedgerRow>> {
        let mut rows = self.ledger().pending_for(site_id, limit)?;
        if rows.len() < limit {
            let retry_after = Duration::seconds(
                i64::try_from(self.settings.failed_retry_after_secs).unwrap_or(i64::MAX),
            );
            rows.extend(
                self.ledger()
                    .retryable_for(site_id, limit - rows.len(), retry_after)?,
            );
        }
        Ok(rows)
    }

    pub fn poll_deleting(&self, query: &PollQuery) -> ReconcileResult<Vec<DeletionEntry>> {
        self.ensure_site(&query.site_id)?;
        let rows = self
            .ledger()
            .deletions_for(&query.site_id, self.limit(query))?;
        let entries: Vec<DeletionEntry> = rows
            .into_iter()
            .filter_map(|row: LedgerRow| {
                row.issuer_entry_id.map(|spire_entry_id| DeletionEntry {
                    workload_entry_id: row.entry_id,
                    spire_entry_id,
                })
            })
            .collect();
        debug!(site_id = %query.site_id, count = entries.len(), "polled deletions");
        Ok(entries)
    }

    /// Apply a sync report. Stale reports are acknowledged without effect.
    pub fn record_report(&self, report: ReportRequest) -> ReconcileResult<Acknowledged> {
        let ReportRequest {
            site_id,
            workload_entry_id: entry_id,
            success,
            spire_entry_id,
            error_message,
        } = report;

        let result = self.ledger().report_outcome(
            &site_id,
            &entry_id,
            success,
            spire_entry_id.clone(),
            error_message.clone(),
        );
        let applied = settle(&site_id, &entry_id, result)?;

        if success && applied.is_some() {
            let now = self.ledger().clock().now();
            if let Err(e) = self.registry.sites().touch_last_sync(&site_id, now) {
                warn!(site_id = %site_id, error = %e, "failed to update site last sync time");
            }
        }

        let mut details = json!({
            "site_id": site_id,
            "success": success,
            "spire_entry_id": spire_entry_id,
            "result": effect_name(applied.as_ref()),
        });
        if let Some(error) = &error_message {
            details["error"] = json!(error);
        }
        self.audit(&site_id, ACTION_SYNC, &entry_id, details);

        if success {
            info!(site_id = %site_id, entry_id = %entry_id, "entry synced");
        } else {
            warn!(
                site_id = %site_id,
                entry_id = %entry_id,
                error = error_message.as_deref().unwrap_or_default(),
                "entry sync failed"
            );
        }
        Ok(Acknowledged::YES)
    }

    /// Apply a deletion report. Stale reports are acknowledged without effect.
    pub fn record_deletion(&self, report: ReportDeletionRequest) -> ReconcileResult<Acknowledged> {
        let ReportDeletionRequest {
            site_id,
            workload_entry_id: entry_id,
            success,
            error_message,
        } = report;

        let result =
            self.ledger()
                .report_deletion(&site_id, &entry_id, success, error_message.clone());
        let applied = settle(&site_id, &entry_id, result)?;

        let mut details = json!({
            "site_id": site_id,
            "success": success,
            "result": effect_name(applied.as_ref()),
        });
        if let Some(error) = &error_message {
            details["error"] = json!(error);
        }
        self.audit(&site_id, ACTION_DELETE_SYNC, &entry_id, details);

        info!(site_id = %site_id, entry_id = %entry_id, success, "deletion reported");
        Ok(Acknowledged::YES)
    }

    fn ensure_site(&self, site_id: &SiteId) -> ReconcileResult<()> {
        match self.registry.sites().get(site_id)? {
            Some(_) => Ok(()),
            None => Err(ReconcileError::SiteNotFound(site_id.clone())),
        }
    }

    fn audit(&self, site_id: &SiteId, action: &str, entry_id: &EntryId, details: serde_json::Value) {
        let record = NewAuditRecord::entry(
            &Actor::site_agent(site_id),
            action,
            entry_id.as_str(),
            details,
        );
        if let Err(e) = self.registry.audit().append(record) {
            warn!(site_id = %site_id, entry_id = %entry_id, error = %e, "failed to write audit record");
        }
    }
}

/// Fold a lost race into "acknowledged, nothing applied".
fn settle(
    site_id: &SiteId,
    entry_id: &EntryId,
    result: Result<Effect, LedgerError>,
) -> ReconcileResult<Option<Effect>> {
    match result {
        Ok(effect) => Ok(Some(effect)),
        Err(e) if e.kind() == ErrorKind::ConcurrencyConflict => {
            debug!(site_id = %site_id, entry_id = %entry_id, reason = %e, "report superseded");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn effect_name(effect: Option<&Effect>) -> &'static str {
    match effect {
        Some(Effect::Update(_)) => "updated",
        Some(Effect::Remove) => "removed",
        Some(Effect::Unchanged) => "unchanged",
        None => "superseded",
    }
}

#[async_trait]
impl ReconciliationApi for ReconciliationService {
    async fn poll(&self, site_id: &SiteId, max_entries: u32) -> ApiResult<Vec<PendingEntry>> {
        Ok(self.poll_pending(&PollQuery::new(site_id.clone(), max_entries))?)
    }

    async fn report(&self, report: ReportRequest) -> ApiResult<Acknowledged> {
        Ok(self.record_report(report)?)
    }

    async fn poll_deletions(
        &self,
        site_id: &SiteId,
        max_entries: u32,
    ) -> ApiResult<Vec<DeletionEntry>> {
        Ok(self.poll_deleting(&PollQuery::new(site_id.clone(), max_entries))?)
    }

    async fn report_deletion(&self, report: ReportDeletionRequest) -> ApiResult<Acknowledged> {
        Ok(self.record_deletion(report)?)
    }
}
