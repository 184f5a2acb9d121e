use chrono::{DateTime, Utc};
use sitesync_types::{EntryId, SiteId};

use crate::error::LedgerResult;
use crate::ledger::DeletionPlan;
use crate::row::{LedgerKey, LedgerRow, RowVersion};
use crate::transition::Effect;

/// Read boundary for ledger queries.
///
/// Every site-scoped listing is returned in insertion order (`seq`).
pub trait LedgerReader: Send + Sync {
    fn get(&self, key: &LedgerKey) -> LedgerResult<Option<LedgerRow>>;

    /// Up to `limit` rows in `pending` for the site.
    fn pending_for(&self, site_id: &SiteId, limit: usize) -> LedgerResult<Vec<LedgerRow>>;

    /// Up to `limit` rows in `failed` for the site whose last attempt was
    /// stamped strictly before `cutoff`.
    fn failed_before(
        &self,
        site_id: &SiteId,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> LedgerResult<Vec<LedgerRow>>;

    /// Up to `limit` rows in `deleting` for the site that carry an issuer id.
    fn deleting_for(&self, site_id: &SiteId, limit: usize) -> LedgerResult<Vec<LedgerRow>>;

    /// All rows for one entry, across sites.
    fn rows_for_entry(&self, entry_id: &EntryId) -> LedgerResult<Vec<LedgerRow>>;

    /// All rows for one site, any status.
    fn rows_for_site(&self, site_id: &SiteId) -> LedgerResult<Vec<LedgerRow>>;
}

/// Write boundary for ledger mutations.
///
/// Implementations must make each method atomic with respect to the others.
pub trait LedgerWriter: Send + Sync {
    /// Create `pending` rows for every site that has none yet for `entry_id`.
    /// Returns the sites for which a row was actually created.
    fn insert_pending(
        &self,
        entry_id: &EntryId,
        site_ids: &[SiteId],
        assigned_at: DateTime<Utc>,
    ) -> LedgerResult<Vec<SiteId>>;

    /// Commit `effect` only if the row still carries `expected`.
    ///
    /// Fails with `RowNotFound` if the row is gone and `Conflict` if its
    /// status or version moved since it was read.
    fn compare_and_swap(
        &self,
        key: &LedgerKey,
        expected: RowVersion,
        effect: Effect,
    ) -> LedgerResult<()>;

    /// Start deleting every row of `entry_id`: rows never applied upstream are
    /// removed, the rest move to `deleting`.
    fn begin_deletion(&self, entry_id: &EntryId) -> LedgerResult<DeletionPlan>;
}

/// A full ledger backend.
pub trait LedgerStore: LedgerReader + LedgerWriter {}

impl<T: LedgerReader + LedgerWriter> LedgerStore for T {}
