use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use sitesync_ledger::{DeletionPlan, LedgerRow, SyncLedger};
use sitesync_types::{Actor, Clock, EntryId, SiteId};
use tracing::{info, warn};

use crate::audit::{AuditSink, NewAuditRecord};
use crate::entry::{
    next_token, page_offset, EntryPage, EntryView, ListQuery, NewWorkloadEntry, SiteSyncStatus,
    WorkloadEntry,
};
use crate::error::{RegistryError, RegistryResult};
use crate::site::SiteDirectory;
use crate::store::EntryStore;
use crate::validation::{dedup_sites, validate_entry};

/// Owns workload entries and their site assignments.
#[derive(Clone)]
pub struct WorkloadRegistry {
    entries: Arc<dyn EntryStore>,
    sites: Arc<dyn SiteDirectory>,
    ledger: SyncLedger,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl WorkloadRegistry {
    pub fn new(
        entries: Arc<dyn EntryStore>,
        sites: Arc<dyn SiteDirectory>,
        ledger: SyncLedger,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries,
            sites,
            ledger,
            audit,
            clock,
        }
    }

    pub fn ledger(&self) -> &SyncLedger {
        &self.ledger
    }

    pub fn sites(&self) -> &Arc<dyn SiteDirectory> {
        &self.sites
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// Validate and store a new entry, then create a `pending` ledger row for
    /// each site.
    pub fn create(
        &self,
        actor: &Actor,
        new: NewWorkloadEntry,
        site_ids: &[SiteId],
    ) -> RegistryResult<EntryView> {
        let valid = validate_entry(new)?;
        let site_ids = dedup_sites(site_ids)?;
        self.ensure_sites(&site_ids)?;

        let now = self.clock.now();
        let entry = WorkloadEntry {
            id: EntryId::generate(),
            spiffe_id: valid.spiffe_id,
            parent_id: valid.parent_id,
            selectors: valid.selectors,
            ttl: valid.ttl,
            description: valid.description,
            created_by: actor.clone(),
            created_at: now,
            updated_at: now,
        };
        self.entries.insert(entry.clone())?;
        self.ledger.assign(&entry.id, &site_ids)?;

        info!(entry_id = %entry.id, spiffe_id = %entry.spiffe_id, sites = site_ids.len(), "workload entry created");
        self.record(NewAuditRecord::entry(
            actor,
            "create",
            entry.id.as_str(),
            json!({
                "spiffe_id": entry.spiffe_id,
                "parent_id": entry.parent_id,
                "site_ids": site_ids,
            }),
        ));

        let site_statuses = self.sync_status(&entry.id)?;
        Ok(EntryView {
            entry,
            site_statuses,
        })
    }

    pub fn get(&self, id: &EntryId) -> RegistryResult<EntryView> {
        let entry = self.require(id)?;
        let site_statuses = self.sync_status(id)?;
        Ok(EntryView {
            entry,
            site_statuses,
        })
    }

    /// The bare entry definition, without statuses.
    pub fn entry(&self, id: &EntryId) -> RegistryResult<Option<WorkloadEntry>> {
        self.entries.get(id)
    }

    /// Entries newest first, filtered and paged.
    pub fn list(&self, query: &ListQuery) -> RegistryResult<EntryPage> {
        let page_size = query.effective_page_size();
        let offset = page_offset(query.page_token.as_deref());

        let assigned: Option<Vec<EntryId>> = match &query.site_id {
            Some(site_id) => Some(
                self.ledger
                    .rows_for_site(site_id)?
                    .into_iter()
                    .map(|row| row.entry_id)
                    .collect(),
            ),
            None => None,
        };

        let matching: Vec<WorkloadEntry> = self
            .entries
            .list()?
            .into_iter()
            .filter(|e| {
                query
                    .spiffe_id_prefix
                    .as_deref()
                    .map_or(true, |p| e.spiffe_id.starts_with(p))
            })
            .filter(|e| assigned.as_ref().map_or(true, |ids| ids.contains(&e.id)))
            .collect();
        let total_count = matching.len();

        let entries = matching
            .into_iter()
            .skip(offset)
            .take(page_size)
            .map(|entry| {
                let site_statuses = self.sync_status(&entry.id)?;
                Ok(EntryView {
                    entry,
                    site_statuses,
                })
            })
            .collect::<RegistryResult<Vec<_>>>()?;

        Ok(EntryPage {
            entries,
            next_page_token: next_token(offset, page_size, total_count),
            total_count,
        })
    }

    /// Delete an entry: the definition is removed, then unapplied rows go
    /// away and applied rows move to `deleting` for their agents to revoke.
    ///
    /// A concurrent `assign_to_sites` either finds the definition gone and
    /// rolls back, or its rows exist before the cascade runs.
    pub fn delete(&self, actor: &Actor, id: &EntryId) -> RegistryResult<DeletionPlan> {
        let entry = self
            .entries
            .remove(id)?
            .ok_or_else(|| RegistryError::EntryNotFound(id.clone()))?;
        let plan = self.ledger.mark_entry_deleting(id)?;

        info!(
            entry_id = %id,
            removed = plan.removed.len(),
            deleting = plan.deleting.len(),
            "workload entry deleted"
        );
        self.record(NewAuditRecord::entry(
            actor,
            "delete",
            id.as_str(),
            json!({ "spiffe_id": entry.spiffe_id }),
        ));
        Ok(plan)
    }

    /// Assign an existing entry to more sites. Sites it already has are left
    /// as they are.
    pub fn assign_to_sites(
        &self,
        actor: &Actor,
        id: &EntryId,
        site_ids: &[SiteId],
    ) -> RegistryResult<Vec<SiteSyncStatus>> {
        self.require(id)?;
        let site_ids = dedup_sites(site_ids)?;
        self.ensure_sites(&site_ids)?;

        let created = self.ledger.assign(id, &site_ids)?;
        if self.entries.get(id)?.is_none() {
            // Deleted while the rows were being written.
            let rollback = self.ledger.mark_entry_deleting(id)?;
            warn!(
                entry_id = %id,
                removed = rollback.removed.len(),
                "entry deleted during assignment, rows rolled back"
            );
            return Err(RegistryError::EntryNotFound(id.clone()));
        }
        info!(
            entry_id = %id,
            requested = site_ids.len(),
            created = created.len(),
            "entry assigned to sites"
        );
        self.record(NewAuditRecord::entry(
            actor,
            "assign",
            id.as_str(),
            json!({ "site_ids": site_ids }),
        ));
        self.sync_status(id)
    }

    /// Ledger rows for an entry joined with site names, sorted by site name.
    ///
    /// Rows whose entry definition is already gone (mid-deletion) are still
    /// reported; an unknown entry with no rows yields an empty list.
    pub fn sync_status(&self, id: &EntryId) -> RegistryResult<Vec<SiteSyncStatus>> {
        let rows = self.ledger.statuses_for(id)?;
        self.join_site_names(rows)
    }

    fn join_site_names(&self, rows: Vec<LedgerRow>) -> RegistryResult<Vec<SiteSyncStatus>> {
        let names: HashMap<SiteId, String> = self
            .sites
            .list(None)?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect();
        let mut out: Vec<SiteSyncStatus> = rows
            .into_iter()
            .map(|row| {
                let name = names.get(&row.site_id).cloned().unwrap_or_default();
                SiteSyncStatus::from_row(row, name)
            })
            .collect();
        out.sort_by(|a, b| a.site_name.cmp(&b.site_name).then_with(|| a.site_id.cmp(&b.site_id)));
        Ok(out)
    }

    fn require(&self, id: &EntryId) -> RegistryResult<WorkloadEntry> {
        self.entries
            .get(id)?
            .ok_or_else(|| RegistryError::EntryNotFound(id.clone()))
    }

    fn ensure_sites(&self, site_ids: &[SiteId]) -> RegistryResult<()> {
        for site_id in site_ids {
            if self.sites.get(site_id)?.is_none() {
                return Err(RegistryError::SiteNotFound(site_id.clone()));
            }
        }
        Ok(())
    }

    /// Append to the audit log; failures are logged and swallowed.
    fn record(&self, record: NewAuditRecord) {
        let action = record.action.clone();
        if let Err(e) = self.audit.append(record) {
            warn!(error = %e, action = %action, "failed to write audit record");
        }
    }
}

impl std::fmt::Debug for WorkloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditQuery, InMemoryAuditLog};
    use crate::site::{InMemorySiteDirectory, Site};
    use crate::store::InMemoryEntryStore;
    use sitesync_ledger::SyncStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sitesync_types::{ErrorKind, IssuerEntryId, ManualClock, Selector};

    struct Fixture {
        registry: WorkloadRegistry,
        audit: Arc<InMemoryAuditLog>,
    }

    fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let sites = InMemorySiteDirectory::with_sites([
            Site::new("A", "zulu"),
            Site::new("B", "alpha"),
            Site::new("C", "mike"),
        ])
        .unwrap();
        let audit = Arc::new(InMemoryAuditLog::new(clock.clone()));
        let registry = WorkloadRegistry::new(
            Arc::new(InMemoryEntryStore::new()),
            Arc::new(sites),
            SyncLedger::in_memory(clock.clone()),
            audit.clone(),
            clock,
        );
        Fixture { registry, audit }
    }

    fn new_entry(path: &str) -> NewWorkloadEntry {
        NewWorkloadEntry {
            spiffe_id: format!("spiffe://example.org/{path}"),
            parent_id: "spiffe://example.org/node".into(),
            selectors: vec![Selector::new("unix:uid", "1000")],
            ttl: 3600,
            description: "test".into(),
        }
    }

    fn sites(ids: &[&str]) -> Vec<SiteId> {
        ids.iter().map(|s| SiteId::from(*s)).collect()
    }

    fn alice() -> Actor {
        Actor::from("alice")
    }

    #[test]
    fn create_assigns_pending_rows_sorted_by_site_name() {
        let f = fixture();
        let view = f
            .registry
            .create(&alice(), new_entry("web"), &sites(&["A", "B"]))
            .unwrap();
        assert_eq!(view.entry.created_by, alice());
        let names: Vec<&str> = view.site_statuses.iter().map(|s| s.site_name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zulu"]);
        assert!(view
            .site_statuses
            .iter()
            .all(|s| s.status == SyncStatus::Pending));
        assert_eq!(f.audit.len().unwrap(), 1);
    }

    #[test]
    fn create_rejects_unknown_site() {
        let f = fixture();
        let err = f
            .registry
            .create(&alice(), new_entry("web"), &sites(&["A", "Z"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(f.registry.list(&ListQuery::default()).unwrap().total_count, 0);
    }

    #[test]
    fn assign_is_idempotent() {
        let f = fixture();
        let view = f
            .registry
            .create(&alice(), new_entry("web"), &sites(&["A"]))
            .unwrap();
        let id = view.entry.id;
        let statuses = f
            .registry
            .assign_to_sites(&alice(), &id, &sites(&["A", "C", "C"]))
            .unwrap();
        assert_eq!(statuses.len(), 2);
        let again = f
            .registry
            .assign_to_sites(&alice(), &id, &sites(&["C"]))
            .unwrap();
        assert_eq!(again, statuses);
    }

    /// Entry store that loses an entry to a concurrent delete after a given
    /// number of reads.
    struct VanishingStore {
        inner: InMemoryEntryStore,
        reads_left: AtomicUsize,
    }

    impl EntryStore for VanishingStore {
        fn insert(&self, entry: WorkloadEntry) -> RegistryResult<()> {
            self.inner.insert(entry)
        }

        fn get(&self, id: &EntryId) -> RegistryResult<Option<WorkloadEntry>> {
            let left = self.reads_left.load(Ordering::SeqCst);
            if left == 0 {
                self.inner.remove(id)?;
                return Ok(None);
            }
            self.reads_left.store(left - 1, Ordering::SeqCst);
            self.inner.get(id)
        }

        fn remove(&self, id: &EntryId) -> RegistryResult<Option<WorkloadEntry>> {
            self.inner.remove(id)
        }

        fn list(&self) -> RegistryResult<Vec<WorkloadEntry>> {
            self.inner.list()
        }
    }

    #[test]
    fn assign_racing_delete_leaves_no_rows() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let store = Arc::new(VanishingStore {
            inner: InMemoryEntryStore::new(),
            reads_left: AtomicUsize::new(usize::MAX),
        });
        let registry = WorkloadRegistry::new(
            store.clone(),
            Arc::new(
                InMemorySiteDirectory::with_sites([Site::new("A", "a"), Site::new("B", "b")])
                    .unwrap(),
            ),
            SyncLedger::in_memory(clock.clone()),
            Arc::new(InMemoryAuditLog::new(clock.clone())),
            clock,
        );
        let id = registry
            .create(&alice(), new_entry("web"), &sites(&["A"]))
            .unwrap()
            .entry
            .id;

        // The existence check passes; the entry is gone by the time the
        // rows have been written.
        store.reads_left.store(1, Ordering::SeqCst);
        let err = registry
            .assign_to_sites(&alice(), &id, &sites(&["B"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(registry.ledger().rows_for_site(&SiteId::from("A")).unwrap().is_empty());
        assert!(registry.ledger().rows_for_site(&SiteId::from("B")).unwrap().is_empty());
    }

    #[test]
    fn delete_of_unknown_entry_is_not_found() {
        let f = fixture();
        let err = f
            .registry
            .delete(&alice(), &EntryId::from("ghost"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(f.audit.len().unwrap(), 0);
    }

    #[test]
    fn delete_cascades_through_the_ledger() {
        let f = fixture();
        let id = f
            .registry
            .create(&alice(), new_entry("web"), &sites(&["A", "B"]))
            .unwrap()
            .entry
            .id;
        f.registry
            .ledger()
            .report_outcome(&SiteId::from("B"), &id, true, Some(IssuerEntryId::from("x1")), None)
            .unwrap();

        let plan = f.registry.delete(&alice(), &id).unwrap();
        assert_eq!(plan.removed, sites(&["A"]));
        assert_eq!(plan.deleting, sites(&["B"]));

        assert_eq!(f.registry.get(&id).unwrap_err().kind(), ErrorKind::NotFound);
        let statuses = f.registry.sync_status(&id).unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status, SyncStatus::Deleting);

        let deletes = f
            .audit
            .list(&AuditQuery {
                resource_id: Some(id.as_str().into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(deletes.entries[0].action, "delete");
        assert_eq!(deletes.entries[0].actor, alice());
    }

    #[test]
    fn list_tolerates_out_of_range_tokens() {
        let f = fixture();
        f.registry
            .create(&alice(), new_entry("web"), &sites(&["A"]))
            .unwrap();
        let page = f
            .registry
            .list(&ListQuery {
                page_size: 1000,
                page_token: Some(usize::MAX.to_string()),
                ..Default::default()
            })
            .unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(page.next_page_token, None);
        assert_eq!(page.total_count, 1);
    }

    #[test]
    fn list_filters_and_pages() {
        let f = fixture();
        for (path, site) in [("web", "A"), ("db", "B"), ("web-2", "A")] {
            f.registry
                .create(&alice(), new_entry(path), &sites(&[site]))
                .unwrap();
        }

        let by_site = f
            .registry
            .list(&ListQuery {
                site_id: Some(SiteId::from("A")),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_site.total_count, 2);

        let by_prefix = f
            .registry
            .list(&ListQuery {
                spiffe_id_prefix: Some("spiffe://example.org/web".into()),
                page_size: 1,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_prefix.total_count, 2);
        assert_eq!(by_prefix.entries.len(), 1);
        assert_eq!(by_prefix.entries[0].entry.spiffe_id.path(), "/web-2");
        assert_eq!(by_prefix.next_page_token.as_deref(), Some("1"));
    }
}
