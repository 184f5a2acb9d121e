use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitesync_ledger::{LedgerRow, SyncStatus};
use sitesync_types::{Actor, EntryId, IssuerEntryId, Selector, SiteId, SpiffeId};

/// Default page size for entry listings.
pub const DEFAULT_PAGE_SIZE: usize = 20;
/// Upper bound on any listing page.
pub const MAX_PAGE_SIZE: usize = 100;

/// A workload registration directive.
///
/// Immutable once created; the only way to change one is to delete it and
/// create a new entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadEntry {
    pub id: EntryId,
    pub spiffe_id: SpiffeId,
    pub parent_id: SpiffeId,
    pub selectors: Vec<Selector>,
    pub ttl: u32,
    #[serde(default)]
    pub description: String,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields of an entry, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkloadEntry {
    pub spiffe_id: String,
    pub parent_id: String,
    pub selectors: Vec<Selector>,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub description: String,
}

/// Sync state of one entry at one site, joined with the site's name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSyncStatus {
    pub site_id: SiteId,
    pub site_name: String,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spire_entry_id: Option<IssuerEntryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
}

impl SiteSyncStatus {
    pub fn from_row(row: LedgerRow, site_name: String) -> Self {
        Self {
            site_id: row.site_id,
            site_name,
            status: row.sync_status,
            spire_entry_id: row.issuer_entry_id,
            last_sync_at: row.last_sync_at,
            sync_error: row.sync_error,
        }
    }
}

/// An entry together with its per-site status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryView {
    #[serde(flatten)]
    pub entry: WorkloadEntry,
    pub site_statuses: Vec<SiteSyncStatus>,
}

/// Filters and paging for entry listings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub page_size: usize,
    /// Offset into the result set, as returned in `next_page_token`.
    pub page_token: Option<String>,
    pub site_id: Option<SiteId>,
    pub spiffe_id_prefix: Option<String>,
}

impl ListQuery {
    /// Page size after defaulting and clamping to [`MAX_PAGE_SIZE`].
    pub fn effective_page_size(&self) -> usize {
        page_size_or(self.page_size, DEFAULT_PAGE_SIZE)
    }
}

/// One page of entries, newest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPage {
    pub entries: Vec<EntryView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub total_count: usize,
}

/// `0` means `default`; anything larger than [`MAX_PAGE_SIZE`] is clamped.
pub(crate) fn page_size_or(requested: usize, default: usize) -> usize {
    match requested {
        0 => default,
        n => n.min(MAX_PAGE_SIZE),
    }
}

/// Decode an offset page token. Unparseable tokens restart from zero.
pub(crate) fn page_offset(token: Option<&str>) -> usize {
    token.and_then(|t| t.trim().parse().ok()).unwrap_or(0)
}

/// Token for the page after `offset`, if any rows remain.
pub(crate) fn next_token(offset: usize, page_size: usize, total: usize) -> Option<String> {
    offset
        .checked_add(page_size)
        .filter(|next| *next < total)
        .map(|next| next.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_defaults() {
        let mut q = ListQuery::default();
        assert_eq!(q.effective_page_size(), 20);
        q.page_size = 101;
        assert_eq!(q.effective_page_size(), 100);
        q.page_size = usize::MAX;
        assert_eq!(q.effective_page_size(), 100);
        q.page_size = 5;
        assert_eq!(q.effective_page_size(), 5);
    }

    #[test]
    fn page_tokens() {
        assert_eq!(page_offset(None), 0);
        assert_eq!(page_offset(Some("40")), 40);
        assert_eq!(page_offset(Some("garbage")), 0);
        assert_eq!(next_token(0, 20, 45).as_deref(), Some("20"));
        assert_eq!(next_token(40, 20, 45), None);
        assert_eq!(next_token(usize::MAX, 20, 45), None);
        assert_eq!(page_offset(Some(&usize::MAX.to_string())), usize::MAX);
    }

    #[test]
    fn new_entry_deserializes_with_defaults() {
        let json = r#"{
            "spiffe_id": "spiffe://example.org/web",
            "parent_id": "spiffe://example.org/node",
            "selectors": [{"type": "unix", "value": "uid:1000"}]
        }"#;
        let entry: NewWorkloadEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.ttl, 0);
        assert_eq!(entry.selectors[0], Selector::new("unix", "uid:1000"));
    }
}
