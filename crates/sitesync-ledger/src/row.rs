use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitesync_types::{EntryId, IssuerEntryId, SiteId};

/// Reconciliation state of one (site, entry) pair.
///
/// ```text
/// pending ──ok──▶ synced ◀──ok── failed
///    │              │  ▲            ▲
///    └────fail──────┴──┼────fail────┘
///                      │
/// synced|failed ──delete──▶ deleting ──revoked──▶ (row removed)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
    Deleting,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            "deleting" => Ok(Self::Deleting),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// Composite primary key of a ledger row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub site_id: SiteId,
    pub entry_id: EntryId,
}

impl LedgerKey {
    pub fn new(site_id: impl Into<SiteId>, entry_id: impl Into<EntryId>) -> Self {
        Self {
            site_id: site_id.into(),
            entry_id: entry_id.into(),
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site_id, self.entry_id)
    }
}

/// The (status, version) pair a writer observed before planning an update.
/// Commits are conditional on the row still carrying exactly this pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowVersion {
    pub status: SyncStatus,
    pub version: u64,
}

/// One persisted ledger row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub site_id: SiteId,
    pub entry_id: EntryId,
    pub sync_status: SyncStatus,
    pub issuer_entry_id: Option<IssuerEntryId>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    pub assigned_at: DateTime<Utc>,
    /// Store-wide insertion order; FIFO key for polling.
    pub seq: u64,
    /// Bumped on every committed change.
    pub version: u64,
}

impl LedgerRow {
    pub fn pending(key: LedgerKey, assigned_at: DateTime<Utc>, seq: u64) -> Self {
        Self {
            site_id: key.site_id,
            entry_id: key.entry_id,
            sync_status: SyncStatus::Pending,
            issuer_entry_id: None,
            last_sync_at: None,
            sync_error: None,
            assigned_at,
            seq,
            version: 1,
        }
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey {
            site_id: self.site_id.clone(),
            entry_id: self.entry_id.clone(),
        }
    }

    pub fn observed(&self) -> RowVersion {
        RowVersion {
            status: self.sync_status,
            version: self.version,
        }
    }

    /// Whether the issuer holds (or may hold) a registration for this row.
    pub fn was_applied(&self) -> bool {
        self.issuer_entry_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_roundtrip() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Synced,
            SyncStatus::Failed,
            SyncStatus::Deleting,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("gone".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn new_rows_start_pending_unapplied() {
        let row = LedgerRow::pending(LedgerKey::new("a", "e"), Utc::now(), 7);
        assert_eq!(row.sync_status, SyncStatus::Pending);
        assert!(!row.was_applied());
        assert_eq!(row.version, 1);
        assert_eq!(row.seq, 7);
        assert_eq!(row.key(), LedgerKey::new("a", "e"));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SyncStatus::Deleting).unwrap(),
            "\"deleting\""
        );
    }
}
