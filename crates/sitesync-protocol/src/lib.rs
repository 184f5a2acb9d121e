//! Reconciliation protocol between the SiteSync registry and site agents.
//!
//! Agents pull work and push outcomes; nothing is ever pushed to a site.
//! Every verb is safe to repeat with the same arguments, since an agent
//! cannot tell whether an earlier report was lost in transit.
//!
//! - [`ReconciliationApi`] is the contract, implemented in-process by the
//!   reconciliation service and remotely by the agent's HTTP client.
//! - [`message`] holds the JSON bodies exchanged over HTTP.
//! - [`ApiError`] carries an [`ErrorKind`](sitesync_types::ErrorKind) across
//!   the wire so agents can tell "forget this item" from "try again later".

pub mod api;
pub mod endpoint;
pub mod error;
pub mod message;

pub use api::ReconciliationApi;
pub use endpoint::{endpoints, HealthResponse};
pub use error::{ApiError, ApiResult};
pub use message::{
    Acknowledged, DeletionEntry, DeletionPollResponse, PendingEntry, PollQuery, PollResponse,
    ReportDeletionRequest, ReportRequest, DEFAULT_MAX_ENTRIES, MAX_ENTRIES_LIMIT,
};
