use async_trait::async_trait;
use sitesync_types::SiteId;

use crate::error::ApiResult;
use crate::message::{
    Acknowledged, DeletionEntry, PendingEntry, ReportDeletionRequest, ReportRequest,
};

/// The contract a site agent consumes.
///
/// All four verbs are idempotent. A report that lost a race against a newer
/// one is still acknowledged; the winning report stands. A report for a
/// (site, entry) pair the registry no longer tracks fails with
/// `ErrorKind::NotFound`, which the agent treats as "drop and move on".
#[async_trait]
pub trait ReconciliationApi: Send + Sync {
    /// Entries to (re)apply at `site_id`, oldest first. `max_entries` of 0
    /// means the default batch size.
    async fn poll(&self, site_id: &SiteId, max_entries: u32) -> ApiResult<Vec<PendingEntry>>;

    async fn report(&self, report: ReportRequest) -> ApiResult<Acknowledged>;

    /// Issuer registrations to revoke at `site_id`.
    async fn poll_deletions(
        &self,
        site_id: &SiteId,
        max_entries: u32,
    ) -> ApiResult<Vec<DeletionEntry>>;

    async fn report_deletion(&self, report: ReportDeletionRequest) -> ApiResult<Acknowledged>;
}
