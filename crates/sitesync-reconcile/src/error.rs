use sitesync_ledger::LedgerError;
use sitesync_protocol::ApiError;
use sitesync_registry::RegistryError;
use sitesync_types::{ErrorKind, SiteId};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("site not found: {0}")]
    SiteNotFound(SiteId),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SiteNotFound(_) => ErrorKind::NotFound,
            Self::Ledger(e) => e.kind(),
            Self::Registry(e) => e.kind(),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        ApiError::new(err.kind(), err.to_string())
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
