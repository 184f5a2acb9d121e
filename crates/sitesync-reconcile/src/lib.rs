//! Reconciliation service for SiteSync.
//!
//! [`ReconciliationService`] implements the agent-facing
//! [`ReconciliationApi`](sitesync_protocol::ReconciliationApi) on top of the
//! registry and its sync ledger. It owns the policy decisions of the poll
//! path: batch limits, the delayed retry of failed rows, and how stale or
//! duplicate reports are acknowledged.

pub mod error;
pub mod service;

pub use error::{ReconcileError, ReconcileResult};
pub use service::{ReconcileSettings, ReconciliationService, DEFAULT_FAILED_RETRY_AFTER_SECS};
