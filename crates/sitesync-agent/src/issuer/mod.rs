//! The apply/revoke capability against a site's local identity issuer.
//!
//! Adapters may fail transiently or permanently; the agent does not tell the
//! two apart. Every failure is reported upstream and retried by a later poll.

mod memory;
mod scripted;
mod spire_cli;

use std::sync::Arc;

use async_trait::async_trait;
use sitesync_protocol::PendingEntry;
use sitesync_types::{IssuerEntryId, Selector, SpiffeId};

use crate::config::IssuerConfig;

pub use memory::MemoryIssuer;
pub use scripted::ScriptedIssuer;
pub use spire_cli::SpireCliIssuer;

/// What the issuer needs to register one workload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyRequest {
    pub spiffe_id: SpiffeId,
    pub parent_id: SpiffeId,
    pub selectors: Vec<Selector>,
    pub ttl: u32,
}

impl From<&PendingEntry> for ApplyRequest {
    fn from(entry: &PendingEntry) -> Self {
        Self {
            spiffe_id: entry.spiffe_id.clone(),
            parent_id: entry.parent_id.clone(),
            selectors: entry.selectors.clone(),
            ttl: entry.ttl,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IssuerError {
    #[error("issuer rejected the request: {0}")]
    Rejected(String),

    #[error("issuer unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected issuer output: {0}")]
    Malformed(String),

    #[error("issuer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IssuerResult<T> = Result<T, IssuerError>;

/// A local identity issuer.
#[async_trait]
pub trait IssuerClient: Send + Sync {
    /// Register a workload and return the issuer's id for it.
    async fn apply(&self, request: &ApplyRequest) -> IssuerResult<IssuerEntryId>;

    /// Remove a registration. Removing one that is already gone succeeds.
    async fn revoke(&self, id: &IssuerEntryId) -> IssuerResult<()>;
}

/// Build the adapter selected by `config`.
pub fn from_config(config: &IssuerConfig) -> Arc<dyn IssuerClient> {
    match config {
        IssuerConfig::Memory => Arc::new(MemoryIssuer::new()),
        IssuerConfig::SpireCli {
            binary,
            socket_path,
        } => Arc::new(SpireCliIssuer::new(binary.clone(), socket_path.clone())),
    }
}
