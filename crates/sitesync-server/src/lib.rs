//! HTTP server for the SiteSync registry.
//!
//! Serves the registry REST API (sites, workload entries, audit) and the
//! four agent reconciliation verbs over one axum router. All state lives in
//! memory and is rebuilt from the config file's site list at startup.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::{ServerConfig, SiteSeed};
pub use error::{ServerError, ServerResult};
pub use router::{build_router, AppState};
pub use server::SiteSyncServer;
