//! Sync ledger for SiteSync.
//!
//! The ledger holds exactly one row per (site, workload entry) pair and is
//! the single source of truth for how far that entry has been applied at
//! that site. It provides:
//! - The row model ([`LedgerRow`], [`SyncStatus`])
//! - A pure transition function ([`plan_transition`]) over agent outcomes
//! - `LedgerReader` / `LedgerWriter` storage boundaries with compare-and-swap
//!   commits
//! - [`InMemoryLedgerStore`] for tests, demos, and single-process servers
//! - [`SyncLedger`], the contract the registry and reconciliation layers use

pub mod error;
pub mod ledger;
pub mod memory;
pub mod row;
pub mod traits;
pub mod transition;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{DeletionPlan, SyncLedger};
pub use memory::InMemoryLedgerStore;
pub use row::{LedgerKey, LedgerRow, RowVersion, SyncStatus};
pub use traits::{LedgerReader, LedgerStore, LedgerWriter};
pub use transition::{plan_transition, Effect, Outcome};
