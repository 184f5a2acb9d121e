use sitesync_ledger::LedgerError;
use sitesync_types::{EntryId, ErrorKind, SiteId, TypeError};

/// Errors produced by registry, site directory, and audit operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("workload entry not found: {0}")]
    EntryNotFound(EntryId),

    #[error("site not found: {0}")]
    SiteNotFound(SiteId),

    #[error("duplicate site: {0}")]
    DuplicateSite(SiteId),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("audit log error: {0}")]
    Audit(String),

    #[error("registry lock poisoned: {0}")]
    LockPoisoned(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EntryNotFound(_) | Self::SiteNotFound(_) => ErrorKind::NotFound,
            Self::DuplicateSite(_) => ErrorKind::ConcurrencyConflict,
            Self::Validation(_) | Self::Type(_) => ErrorKind::Validation,
            Self::Ledger(e) => e.kind(),
            Self::Audit(_) | Self::LockPoisoned(_) => ErrorKind::Internal,
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(
            RegistryError::EntryNotFound(EntryId::from("e")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            RegistryError::Type(TypeError::EmptyIdentifier).kind(),
            ErrorKind::Validation
        );
        let ledger = LedgerError::RowNotFound {
            site_id: SiteId::from("s"),
            entry_id: EntryId::from("e"),
        };
        assert_eq!(RegistryError::from(ledger).kind(), ErrorKind::NotFound);
    }
}
