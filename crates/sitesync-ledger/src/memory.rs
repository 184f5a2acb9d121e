//! In-memory ledger store.
//!
//! [`InMemoryLedgerStore`] keeps every row in a `BTreeMap` behind a single
//! `RwLock`, so each trait method is one critical section. Data is lost when
//! the store is dropped.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use sitesync_types::{EntryId, SiteId};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::DeletionPlan;
use crate::row::{LedgerKey, LedgerRow, RowVersion, SyncStatus};
use crate::traits::{LedgerReader, LedgerWriter};
use crate::transition::Effect;

#[derive(Debug, Default)]
struct Rows {
    rows: BTreeMap<LedgerKey, LedgerRow>,
    next_seq: u64,
}

impl Rows {
    fn site_rows(
        &self,
        site_id: &SiteId,
        filter: impl Fn(&LedgerRow) -> bool,
        limit: usize,
    ) -> Vec<LedgerRow> {
        let mut rows: Vec<&LedgerRow> = self
            .rows
            .values()
            .filter(|row| &row.site_id == site_id && filter(row))
            .collect();
        rows.sort_by_key(|row| row.seq);
        rows.into_iter().take(limit).cloned().collect()
    }
}

/// An in-memory implementation of the ledger storage traits.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: RwLock<Rows>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held.
    pub fn len(&self) -> LedgerResult<usize> {
        Ok(self.read()?.rows.len())
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> LedgerResult<std::sync::RwLockReadGuard<'_, Rows>> {
        self.inner
            .read()
            .map_err(|e| LedgerError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> LedgerResult<std::sync::RwLockWriteGuard<'_, Rows>> {
        self.inner
            .write()
            .map_err(|e| LedgerError::LockPoisoned(e.to_string()))
    }
}

impl LedgerReader for InMemoryLedgerStore {
    fn get(&self, key: &LedgerKey) -> LedgerResult<Option<LedgerRow>> {
        Ok(self.read()?.rows.get(key).cloned())
    }

    fn pending_for(&self, site_id: &SiteId, limit: usize) -> LedgerResult<Vec<LedgerRow>> {
        let rows = self.read()?;
        Ok(rows.site_rows(
            site_id,
            |row| row.sync_status == SyncStatus::Pending,
            limit,
        ))
    }

    fn failed_before(
        &self,
        site_id: &SiteId,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> LedgerResult<Vec<LedgerRow>> {
        let rows = self.read()?;
        Ok(rows.site_rows(
            site_id,
            |row| {
                row.sync_status == SyncStatus::Failed
                    && row.last_sync_at.map_or(true, |at| at < cutoff)
            },
            limit,
        ))
    }

    fn deleting_for(&self, site_id: &SiteId, limit: usize) -> LedgerResult<Vec<LedgerRow>> {
        let rows = self.read()?;
        Ok(rows.site_rows(
            site_id,
            |row| row.sync_status == SyncStatus::Deleting && row.issuer_entry_id.is_some(),
            limit,
        ))
    }

    fn rows_for_entry(&self, entry_id: &EntryId) -> LedgerResult<Vec<LedgerRow>> {
        let rows = self.read()?;
        let mut out: Vec<LedgerRow> = rows
            .rows
            .values()
            .filter(|row| &row.entry_id == entry_id)
            .cloned()
            .collect();
        out.sort_by_key(|row| row.seq);
        Ok(out)
    }

    fn rows_for_site(&self, site_id: &SiteId) -> LedgerResult<Vec<LedgerRow>> {
        let rows = self.read()?;
        Ok(rows.site_rows(site_id, |_| true, usize::MAX))
    }
}

impl LedgerWriter for InMemoryLedgerStore {
    fn insert_pending(
        &self,
        entry_id: &EntryId,
        site_ids: &[SiteId],
        assigned_at: DateTime<Utc>,
    ) -> LedgerResult<Vec<SiteId>> {
        let mut rows = self.write()?;
        let mut seen = HashSet::new();
        let mut created = Vec::new();
        for site_id in site_ids {
            if !seen.insert(site_id) {
                continue;
            }
            let key = LedgerKey {
                site_id: site_id.clone(),
                entry_id: entry_id.clone(),
            };
            if rows.rows.contains_key(&key) {
                continue;
            }
            rows.next_seq += 1;
            let seq = rows.next_seq;
            rows.rows
                .insert(key.clone(), LedgerRow::pending(key, assigned_at, seq));
            created.push(site_id.clone());
        }
        Ok(created)
    }

    fn compare_and_swap(
        &self,
        key: &LedgerKey,
        expected: RowVersion,
        effect: Effect,
    ) -> LedgerResult<()> {
        let mut rows = self.write()?;
        let current = rows.rows.get(key).ok_or_else(|| LedgerError::RowNotFound {
            site_id: key.site_id.clone(),
            entry_id: key.entry_id.clone(),
        })?;
        if current.observed() != expected {
            return Err(LedgerError::Conflict {
                site_id: key.site_id.clone(),
                entry_id: key.entry_id.clone(),
                expected: expected.version,
                found: current.version,
            });
        }
        match effect {
            Effect::Update(row) => {
                rows.rows.insert(key.clone(), row);
            }
            Effect::Remove => {
                rows.rows.remove(key);
            }
            Effect::Unchanged => {}
        }
        Ok(())
    }

    fn begin_deletion(&self, entry_id: &EntryId) -> LedgerResult<DeletionPlan> {
        let mut rows = self.write()?;
        let keys: Vec<LedgerKey> = rows
            .rows
            .keys()
            .filter(|key| &key.entry_id == entry_id)
            .cloned()
            .collect();

        let mut plan = DeletionPlan::default();
        for key in keys {
            let applied = rows.rows.get(&key).is_some_and(LedgerRow::was_applied);
            if applied {
                if let Some(row) = rows.rows.get_mut(&key) {
                    if row.sync_status != SyncStatus::Deleting {
                        row.sync_status = SyncStatus::Deleting;
                        row.version += 1;
                    }
                }
                plan.deleting.push(key.site_id);
            } else {
                rows.rows.remove(&key);
                plan.removed.push(key.site_id);
            }
        }
        Ok(plan)
    }
}
