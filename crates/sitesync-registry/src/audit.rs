//! Append-only audit log.
//!
//! Audit writes are never part of a consistency boundary: callers log a
//! failed `append` and carry on.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitesync_types::{Actor, Clock};

use crate::entry::{next_token, page_offset, page_size_or};
use crate::error::{RegistryError, RegistryResult};

pub const DEFAULT_AUDIT_PAGE_SIZE: usize = 50;

/// Resource type recorded for workload entry actions.
pub const RESOURCE_WORKLOAD_ENTRY: &str = "workload_entry";

/// A stored audit record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,
}

/// An audit record before the sink assigns its id and timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct NewAuditRecord {
    pub actor: Actor,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,
}

impl NewAuditRecord {
    /// A record about a workload entry.
    pub fn entry(
        actor: &Actor,
        action: &str,
        entry_id: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            actor: actor.clone(),
            action: action.to_string(),
            resource_type: RESOURCE_WORKLOAD_ENTRY.to_string(),
            resource_id: entry_id.into(),
            details,
        }
    }
}

/// Filters and paging for audit listings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    pub page_size: usize,
    pub page_token: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub actor: Option<String>,
    /// Inclusive lower bound on `timestamp`.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`.
    pub until: Option<DateTime<Utc>>,
}

impl AuditQuery {
    pub fn effective_page_size(&self) -> usize {
        page_size_or(self.page_size, DEFAULT_AUDIT_PAGE_SIZE)
    }

    fn matches(&self, record: &AuditRecord) -> bool {
        self.resource_type
            .as_deref()
            .map_or(true, |t| record.resource_type == t)
            && self
                .resource_id
                .as_deref()
                .map_or(true, |id| record.resource_id == id)
            && self
                .actor
                .as_deref()
                .map_or(true, |a| record.actor.as_str() == a)
            && self.since.map_or(true, |since| record.timestamp >= since)
            && self.until.map_or(true, |until| record.timestamp <= until)
    }
}

/// One page of audit records, newest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditPage {
    pub entries: Vec<AuditRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Append-only sink for audit records.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: NewAuditRecord) -> RegistryResult<AuditRecord>;

    fn list(&self, query: &AuditQuery) -> RegistryResult<AuditPage>;
}

/// Audit log held in memory.
pub struct InMemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryAuditLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            clock,
        }
    }

    pub fn len(&self) -> RegistryResult<usize> {
        let records = self
            .records
            .read()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        Ok(records.len())
    }

    pub fn is_empty(&self) -> RegistryResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for InMemoryAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAuditLog").finish_non_exhaustive()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(&self, record: NewAuditRecord) -> RegistryResult<AuditRecord> {
        let mut records = self
            .records
            .write()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        let stored = AuditRecord {
            id: records.len() as u64 + 1,
            timestamp: self.clock.now(),
            actor: record.actor,
            action: record.action,
            resource_type: record.resource_type,
            resource_id: record.resource_id,
            details: record.details,
        };
        records.push(stored.clone());
        Ok(stored)
    }

    fn list(&self, query: &AuditQuery) -> RegistryResult<AuditPage> {
        let records = self
            .records
            .read()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        let page_size = query.effective_page_size();
        let offset = page_offset(query.page_token.as_deref());

        // Appends are in clock order, so newest first is reverse insertion order.
        let matching: Vec<&AuditRecord> =
            records.iter().rev().filter(|r| query.matches(r)).collect();
        let entries = matching
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|r| (*r).clone())
            .collect();
        Ok(AuditPage {
            entries,
            next_page_token: next_token(offset, page_size, matching.len()),
        })
    }
}
