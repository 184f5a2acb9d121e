use sitesync_types::{EntryId, ErrorKind, SiteId};

use crate::row::SyncStatus;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("no ledger row for site {site_id}, entry {entry_id}")]
    RowNotFound { site_id: SiteId, entry_id: EntryId },

    #[error(
        "concurrent update of site {site_id}, entry {entry_id}: expected version {expected}, found {found}"
    )]
    Conflict {
        site_id: SiteId,
        entry_id: EntryId,
        expected: u64,
        found: u64,
    },

    #[error("{outcome} report does not apply to a row in state {status}")]
    StaleReport {
        status: SyncStatus,
        outcome: &'static str,
    },

    #[error("invalid report: {0}")]
    InvalidReport(String),

    #[error("ledger lock poisoned: {0}")]
    LockPoisoned(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RowNotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } | Self::StaleReport { .. } => ErrorKind::ConcurrencyConflict,
            Self::InvalidReport(_) => ErrorKind::Validation,
            Self::LockPoisoned(_) => ErrorKind::Internal,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
