//! Workload registry for SiteSync.
//!
//! The registry owns workload entry definitions and decides which sites each
//! entry is assigned to. Assignments become `pending` rows in the
//! [`SyncLedger`](sitesync_ledger::SyncLedger); deleting an entry starts the
//! ledger's deletion cascade.
//!
//! Alongside entries it keeps the [`SiteDirectory`] of registered sites and an
//! append-only [`AuditSink`]. Every mutating call takes the caller's
//! [`Actor`](sitesync_types::Actor) explicitly.

pub mod audit;
pub mod entry;
pub mod error;
pub mod registry;
pub mod site;
pub mod store;
pub mod validation;

pub use audit::{AuditPage, AuditQuery, AuditRecord, AuditSink, InMemoryAuditLog, NewAuditRecord};
pub use entry::{EntryPage, EntryView, ListQuery, NewWorkloadEntry, SiteSyncStatus, WorkloadEntry};
pub use error::{RegistryError, RegistryResult};
pub use registry::WorkloadRegistry;
pub use site::{InMemorySiteDirectory, Site, SiteDirectory, SiteStatus};
pub use store::{EntryStore, InMemoryEntryStore};
