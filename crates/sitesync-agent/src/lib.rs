//! Site agent for SiteSync.
//!
//! One agent runs per site. On a fixed interval it pulls pending entries from
//! the registry, applies each to the site's local issuer, and reports the
//! outcome; then it does the same for pending deletions. Entries are handled
//! one at a time and independently, so one failure never blocks the rest of
//! the batch.
//!
//! - [`SiteAgent`] is the loop itself.
//! - [`IssuerClient`] is the apply/revoke capability, with
//!   [`MemoryIssuer`], [`SpireCliIssuer`], and the [`ScriptedIssuer`] test
//!   double.
//! - [`HttpReconciliationClient`] talks to the registry over HTTP.
//! - [`AgentConfig`] is loaded from TOML and the environment.

pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod issuer;

pub use agent::{CycleReport, SiteAgent};
pub use client::HttpReconciliationClient;
pub use config::{AgentConfig, AgentOverrides, IssuerConfig};
pub use error::{AgentError, AgentResult};
pub use issuer::{
    ApplyRequest, IssuerClient, IssuerError, MemoryIssuer, ScriptedIssuer, SpireCliIssuer,
};
