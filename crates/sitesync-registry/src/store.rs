use std::collections::HashMap;
use std::sync::RwLock;

use sitesync_types::EntryId;

use crate::entry::WorkloadEntry;
use crate::error::{RegistryError, RegistryResult};

/// Storage boundary for workload entry definitions.
pub trait EntryStore: Send + Sync {
    fn insert(&self, entry: WorkloadEntry) -> RegistryResult<()>;

    fn get(&self, id: &EntryId) -> RegistryResult<Option<WorkloadEntry>>;

    /// Remove and return an entry.
    fn remove(&self, id: &EntryId) -> RegistryResult<Option<WorkloadEntry>>;

    /// Every entry, newest first.
    fn list(&self) -> RegistryResult<Vec<WorkloadEntry>>;
}

#[derive(Debug, Default)]
struct Entries {
    by_id: HashMap<EntryId, (u64, WorkloadEntry)>,
    next_seq: u64,
}

/// Entry store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryEntryStore {
    inner: RwLock<Entries>,
}

impl InMemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryStore for InMemoryEntryStore {
    fn insert(&self, entry: WorkloadEntry) -> RegistryResult<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        if inner.by_id.contains_key(&entry.id) {
            return Err(RegistryError::Validation(format!(
                "workload entry {} already exists",
                entry.id
            )));
        }
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.by_id.insert(entry.id.clone(), (seq, entry));
        Ok(())
    }

    fn get(&self, id: &EntryId) -> RegistryResult<Option<WorkloadEntry>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        Ok(inner.by_id.get(id).map(|(_, e)| e.clone()))
    }

    fn remove(&self, id: &EntryId) -> RegistryResult<Option<WorkloadEntry>> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        Ok(inner.by_id.remove(id).map(|(_, e)| e))
    }

    fn list(&self) -> RegistryResult<Vec<WorkloadEntry>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        let mut all: Vec<&(u64, WorkloadEntry)> = inner.by_id.values().collect();
        all.sort_by(|(sa, a), (sb, b)| b.created_at.cmp(&a.created_at).then(sb.cmp(sa)));
        Ok(all.into_iter().map(|(_, e)| e.clone()).collect())
    }
}
