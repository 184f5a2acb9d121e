//! JSON bodies for the agent endpoints.
//!
//! Optional string fields accept `""` as absent, matching clients that always
//! send every key.

use serde::{Deserialize, Deserializer, Serialize};
use sitesync_types::{EntryId, IssuerEntryId, Selector, SiteId, SpiffeId};

/// Batch size used when a poll asks for 0 entries.
pub const DEFAULT_MAX_ENTRIES: u32 = 10;
/// Largest batch a single poll can return.
pub const MAX_ENTRIES_LIMIT: u32 = 100;

/// Query parameters of both poll verbs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollQuery {
    pub site_id: SiteId,
    #[serde(default)]
    pub max_entries: u32,
}

impl PollQuery {
    pub fn new(site_id: SiteId, max_entries: u32) -> Self {
        Self {
            site_id,
            max_entries,
        }
    }

    /// Batch size after defaulting and clamping.
    pub fn effective_limit(&self) -> usize {
        self.effective_limit_within(DEFAULT_MAX_ENTRIES, MAX_ENTRIES_LIMIT)
    }

    /// Batch size with a server-chosen default and ceiling.
    pub fn effective_limit_within(&self, default: u32, max: u32) -> usize {
        match self.max_entries {
            0 => default.min(max) as usize,
            n => n.min(max) as usize,
        }
    }
}

/// An entry the agent should apply to its issuer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub workload_entry_id: EntryId,
    pub spiffe_id: SpiffeId,
    pub parent_id: SpiffeId,
    pub selectors: Vec<Selector>,
    pub ttl: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResponse {
    pub entries: Vec<PendingEntry>,
}

/// Outcome of applying one entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub site_id: SiteId,
    pub workload_entry_id: EntryId,
    pub success: bool,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub spire_entry_id: Option<IssuerEntryId>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
}

impl ReportRequest {
    pub fn applied(site_id: SiteId, entry_id: EntryId, issuer_entry_id: IssuerEntryId) -> Self {
        Self {
            site_id,
            workload_entry_id: entry_id,
            success: true,
            spire_entry_id: Some(issuer_entry_id),
            error_message: None,
        }
    }

    pub fn failed(site_id: SiteId, entry_id: EntryId, error: impl Into<String>) -> Self {
        Self {
            site_id,
            workload_entry_id: entry_id,
            success: false,
            spire_entry_id: None,
            error_message: Some(error.into()),
        }
    }
}

/// An issuer registration the agent should revoke.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionEntry {
    pub workload_entry_id: EntryId,
    pub spire_entry_id: IssuerEntryId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionPollResponse {
    pub entries: Vec<DeletionEntry>,
}

/// Outcome of revoking one entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDeletionRequest {
    pub site_id: SiteId,
    pub workload_entry_id: EntryId,
    pub success: bool,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
}

impl ReportDeletionRequest {
    pub fn revoked(site_id: SiteId, entry_id: EntryId) -> Self {
        Self {
            site_id,
            workload_entry_id: entry_id,
            success: true,
            error_message: None,
        }
    }

    pub fn failed(site_id: SiteId, entry_id: EntryId, error: impl Into<String>) -> Self {
        Self {
            site_id,
            workload_entry_id: entry_id,
            success: false,
            error_message: Some(error.into()),
        }
    }
}

/// Response to every report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledged {
    pub acknowledged: bool,
}

impl Acknowledged {
    pub const YES: Self = Self { acknowledged: true };
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(T::from))
}
