//! Foundation types for SiteSync.
//!
//! SiteSync distributes workload registration entries from a central
//! registry to independent sites, each running an agent that applies them to
//! a local identity issuer. Every other SiteSync crate depends on
//! `sitesync-types`.
//!
//! # Key Types
//!
//! - [`EntryId`] / [`SiteId`] - opaque identifiers for entries and sites
//! - [`IssuerEntryId`] - identifier the local issuer assigned to an applied entry
//! - [`SpiffeId`] - validated `spiffe://` principal
//! - [`Selector`] - attestation (type, value) pair
//! - [`Actor`] - caller identity threaded through mutating operations
//! - [`Clock`] - injectable wall clock ([`SystemClock`], [`ManualClock`])
//! - [`ErrorKind`] - cross-crate error classification

pub mod clock;
pub mod error;
pub mod ids;
pub mod principal;
pub mod selector;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorKind, TypeError};
pub use ids::{Actor, EntryId, IssuerEntryId, SiteId};
pub use principal::SpiffeId;
pub use selector::Selector;
