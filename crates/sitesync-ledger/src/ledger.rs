use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use sitesync_types::{Clock, EntryId, IssuerEntryId, SiteId, SystemClock};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::memory::InMemoryLedgerStore;
use crate::row::{LedgerKey, LedgerRow};
use crate::traits::LedgerStore;
use crate::transition::{plan_transition, Effect, Outcome};

/// Result of starting the deletion of one workload entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionPlan {
    /// Sites whose rows were dropped because nothing was applied there.
    pub removed: Vec<SiteId>,
    /// Sites whose rows now wait for an agent to revoke them.
    pub deleting: Vec<SiteId>,
}

/// The reconciliation state of every (site, entry) pair.
///
/// All mutations go through a read, a pure [`plan_transition`], then a
/// compare-and-swap commit. The ledger never retries on its own; a lost race
/// surfaces as [`LedgerError::Conflict`].
#[derive(Clone)]
pub struct SyncLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl SyncLedger {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// A ledger over a fresh [`InMemoryLedgerStore`].
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(InMemoryLedgerStore::new()), clock)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Create `pending` rows for `entry_id` at each site. Existing pairs are
    /// left alone. Returns the sites that got a new row.
    pub fn assign(&self, entry_id: &EntryId, site_ids: &[SiteId]) -> LedgerResult<Vec<SiteId>> {
        let created = self
            .store
            .insert_pending(entry_id, site_ids, self.clock.now())?;
        debug!(entry_id = %entry_id, created = created.len(), "assigned entry to sites");
        Ok(created)
    }

    pub fn get(&self, site_id: &SiteId, entry_id: &EntryId) -> LedgerResult<Option<LedgerRow>> {
        self.store.get(&LedgerKey {
            site_id: site_id.clone(),
            entry_id: entry_id.clone(),
        })
    }

    /// Oldest-assigned `pending` rows for a site.
    pub fn pending_for(&self, site_id: &SiteId, limit: usize) -> LedgerResult<Vec<LedgerRow>> {
        self.store.pending_for(site_id, limit)
    }

    /// `failed` rows whose last attempt is older than `retry_after`.
    pub fn retryable_for(
        &self,
        site_id: &SiteId,
        limit: usize,
        retry_after: Duration,
    ) -> LedgerResult<Vec<LedgerRow>> {
        let cutoff = self.clock.now() - retry_after;
        self.store.failed_before(site_id, cutoff, limit)
    }

    /// `deleting` rows for a site that still have an issuer registration.
    pub fn deletions_for(&self, site_id: &SiteId, limit: usize) -> LedgerResult<Vec<LedgerRow>> {
        self.store.deleting_for(site_id, limit)
    }

    /// Apply a sync report for one pair.
    pub fn report_outcome(
        &self,
        site_id: &SiteId,
        entry_id: &EntryId,
        success: bool,
        issuer_entry_id: Option<IssuerEntryId>,
        error: Option<String>,
    ) -> LedgerResult<Effect> {
        let outcome = Outcome::from_sync_report(success, issuer_entry_id, error)?;
        self.apply(LedgerKey::new(site_id.clone(), entry_id.clone()), &outcome)
    }

    /// Apply a deletion report for one pair.
    pub fn report_deletion(
        &self,
        site_id: &SiteId,
        entry_id: &EntryId,
        success: bool,
        error: Option<String>,
    ) -> LedgerResult<Effect> {
        let outcome = Outcome::from_deletion_report(success, error);
        self.apply(LedgerKey::new(site_id.clone(), entry_id.clone()), &outcome)
    }

    /// Read, plan, and conditionally commit one outcome.
    pub fn apply(&self, key: LedgerKey, outcome: &Outcome) -> LedgerResult<Effect> {
        let row = self
            .store
            .get(&key)?
            .ok_or_else(|| LedgerError::RowNotFound {
                site_id: key.site_id.clone(),
                entry_id: key.entry_id.clone(),
            })?;
        let effect = plan_transition(&row, outcome, self.clock.now())?;
        self.store
            .compare_and_swap(&key, row.observed(), effect.clone())?;
        debug!(
            site_id = %key.site_id,
            entry_id = %key.entry_id,
            from = %row.sync_status,
            outcome = outcome.name(),
            "ledger row transitioned"
        );
        Ok(effect)
    }

    /// All rows for an entry, across sites.
    pub fn statuses_for(&self, entry_id: &EntryId) -> LedgerResult<Vec<LedgerRow>> {
        self.store.rows_for_entry(entry_id)
    }

    pub fn rows_for_site(&self, site_id: &SiteId) -> LedgerResult<Vec<LedgerRow>> {
        self.store.rows_for_site(site_id)
    }

    /// First half of the entry delete cascade.
    pub fn mark_entry_deleting(&self, entry_id: &EntryId) -> LedgerResult<DeletionPlan> {
        let plan = self.store.begin_deletion(entry_id)?;
        debug!(
            entry_id = %entry_id,
            removed = plan.removed.len(),
            deleting = plan.deleting.len(),
            "entry marked for deletion"
        );
        Ok(plan)
    }
}

impl Default for SyncLedger {
    fn default() -> Self {
        Self::in_memory(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for SyncLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncLedger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::SyncStatus;
    use proptest::prelude::*;
    use sitesync_types::{ErrorKind, ManualClock};

    fn setup() -> (SyncLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (SyncLedger::in_memory(clock.clone()), clock)
    }

    fn ids(list: &[&str]) -> Vec<SiteId> {
        list.iter().map(|s| SiteId::from(*s)).collect()
    }

    fn x(id: &str) -> Option<IssuerEntryId> {
        Some(IssuerEntryId::from(id))
    }

    #[test]
    fn repeated_polls_return_same_rows() {
        let (ledger, _) = setup();
        for e in ["e1", "e2", "e3"] {
            ledger.assign(&EntryId::from(e), &ids(&["a", "b"])).unwrap();
        }
        let site = SiteId::from("a");
        let first = ledger.pending_for(&site, 10).unwrap();
        let second = ledger.pending_for(&site, 10).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn two_site_scenario() {
        let (ledger, _) = setup();
        let e = EntryId::from("E");
        let (a, b) = (SiteId::from("A"), SiteId::from("B"));
        ledger.assign(&e, &[a.clone(), b.clone()]).unwrap();
        assert_eq!(ledger.statuses_for(&e).unwrap().len(), 2);

        let polled = ledger.pending_for(&a, 10).unwrap();
        assert_eq!(polled[0].entry_id, e);
        ledger.report_outcome(&a, &e, true, x("x1"), None).unwrap();

        let row_a = ledger.get(&a, &e).unwrap().unwrap();
        assert_eq!(row_a.sync_status, SyncStatus::Synced);
        assert_eq!(row_a.issuer_entry_id, x("x1"));
        let row_b = ledger.get(&b, &e).unwrap().unwrap();
        assert_eq!(row_b.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn failed_rows_wait_for_the_retry_path() {
        let (ledger, clock) = setup();
        let e = EntryId::from("E");
        let a = SiteId::from("A");
        ledger.assign(&e, &[a.clone()]).unwrap();
        ledger
            .report_outcome(&a, &e, false, None, Some("timeout".into()))
            .unwrap();

        let row = ledger.get(&a, &e).unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::Failed);
        assert_eq!(row.sync_error.as_deref(), Some("timeout"));
        assert!(ledger.pending_for(&a, 10).unwrap().is_empty());

        let delay = Duration::seconds(60);
        assert!(ledger.retryable_for(&a, 10, delay).unwrap().is_empty());
        clock.advance(Duration::seconds(61));
        assert_eq!(ledger.retryable_for(&a, 10, delay).unwrap().len(), 1);
    }

    #[test]
    fn failed_then_synced_clears_error() {
        let (ledger, _) = setup();
        let (a, e) = (SiteId::from("A"), EntryId::from("E"));
        ledger.assign(&e, &[a.clone()]).unwrap();
        ledger
            .report_outcome(&a, &e, false, None, Some("boom".into()))
            .unwrap();
        ledger.report_outcome(&a, &e, true, x("x7"), None).unwrap();
        let row = ledger.get(&a, &e).unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::Synced);
        assert_eq!(row.sync_error, None);
        assert_eq!(row.issuer_entry_id, x("x7"));
    }

    #[test]
    fn delete_cascade_removes_pending_and_marks_synced() {
        let (ledger, _) = setup();
        let e = EntryId::from("E");
        let (a, b) = (SiteId::from("A"), SiteId::from("B"));
        ledger.assign(&e, &[a.clone(), b.clone()]).unwrap();
        ledger.report_outcome(&b, &e, true, x("x1"), None).unwrap();

        let plan = ledger.mark_entry_deleting(&e).unwrap();
        assert_eq!(plan.removed, vec![a.clone()]);
        assert_eq!(plan.deleting, vec![b.clone()]);
        assert!(ledger.get(&a, &e).unwrap().is_none());

        let deletions = ledger.deletions_for(&b, 10).unwrap();
        assert_eq!(deletions.len(), 1);
        assert_eq!(deletions[0].issuer_entry_id, x("x1"));

        ledger
            .report_deletion(&b, &e, false, Some("unavailable".into()))
            .unwrap();
        let row = ledger.get(&b, &e).unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::Deleting);
        assert_eq!(ledger.deletions_for(&b, 10).unwrap().len(), 1);

        assert_eq!(ledger.report_deletion(&b, &e, true, None).unwrap(), Effect::Remove);
        assert!(ledger.statuses_for(&e).unwrap().is_empty());

        let err = ledger.report_deletion(&b, &e, true, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn report_for_unknown_pair_is_not_found() {
        let (ledger, _) = setup();
        let err = ledger
            .report_outcome(&SiteId::from("A"), &EntryId::from("nope"), true, x("x"), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::RowNotFound { .. }));
    }

    #[test]
    fn sync_report_on_deleting_row_is_a_conflict() {
        let (ledger, _) = setup();
        let (a, e) = (SiteId::from("A"), EntryId::from("E"));
        ledger.assign(&e, &[a.clone()]).unwrap();
        ledger.report_outcome(&a, &e, true, x("x1"), None).unwrap();
        ledger.mark_entry_deleting(&e).unwrap();

        let err = ledger
            .report_outcome(&a, &e, false, None, Some("late".into()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
        let row = ledger.get(&a, &e).unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::Deleting);
        assert_eq!(row.sync_error, None);
    }

    #[test]
    fn concurrent_reports_settle_on_one_outcome() {
        for _ in 0..50 {
            let (ledger, _) = setup();
            let (a, e) = (SiteId::from("A"), EntryId::from("E"));
            ledger.assign(&e, &[a.clone()]).unwrap();

            let handles: Vec<_> = [true, false]
                .into_iter()
                .map(|success| {
                    let ledger = ledger.clone();
                    let (a, e) = (a.clone(), e.clone());
                    std::thread::spawn(move || {
                        let issuer = success.then(|| IssuerEntryId::from("x1"));
                        let error = (!success).then(|| "timeout".to_string());
                        let _ = ledger.report_outcome(&a, &e, success, issuer, error);
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let row = ledger.get(&a, &e).unwrap().unwrap();
            match row.sync_status {
                SyncStatus::Synced => {
                    assert_eq!(row.issuer_entry_id, x("x1"));
                    assert_eq!(row.sync_error, None);
                }
                SyncStatus::Failed => {
                    assert_eq!(row.sync_error.as_deref(), Some("timeout"));
                }
                other => panic!("unexpected status {other}"),
            }
        }
    }

    proptest! {
        #[test]
        fn repeated_success_is_idempotent(repeats in 1usize..6, issuer in "[a-z0-9]{1,12}") {
            let (ledger, clock) = setup();
            let (a, e) = (SiteId::from("A"), EntryId::from("E"));
            ledger.assign(&e, &[a.clone()]).unwrap();

            ledger.report_outcome(&a, &e, true, x(&issuer), None).unwrap();
            let once = ledger.get(&a, &e).unwrap().unwrap();

            for _ in 0..repeats {
                clock.advance(Duration::seconds(5));
                let effect = ledger.report_outcome(&a, &e, true, x(&issuer), None).unwrap();
                prop_assert_eq!(effect, Effect::Unchanged);
            }
            prop_assert_eq!(ledger.get(&a, &e).unwrap().unwrap(), once);
        }
    }
}
