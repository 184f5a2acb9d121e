use std::collections::HashSet;

use sitesync_types::{Selector, SiteId, SpiffeId};

use crate::entry::NewWorkloadEntry;
use crate::error::{RegistryError, RegistryResult};

/// An entry whose fields have passed validation.
#[derive(Debug)]
pub(crate) struct ValidEntry {
    pub spiffe_id: SpiffeId,
    pub parent_id: SpiffeId,
    pub selectors: Vec<Selector>,
    pub ttl: u32,
    pub description: String,
}

pub(crate) fn validate_entry(new: NewWorkloadEntry) -> RegistryResult<ValidEntry> {
    let spiffe_id = SpiffeId::parse(new.spiffe_id)?;
    let parent_id = SpiffeId::parse(new.parent_id)?;
    if new.selectors.is_empty() {
        return Err(RegistryError::Validation(
            "at least one selector is required".into(),
        ));
    }
    for selector in &new.selectors {
        selector.validate()?;
    }
    if new.ttl == 0 {
        return Err(RegistryError::Validation("ttl must be positive".into()));
    }
    Ok(ValidEntry {
        spiffe_id,
        parent_id,
        selectors: new.selectors,
        ttl: new.ttl,
        description: new.description,
    })
}

/// Drop repeated site ids, keeping first-seen order. Empty lists are
/// rejected.
pub(crate) fn dedup_sites(site_ids: &[SiteId]) -> RegistryResult<Vec<SiteId>> {
    if site_ids.is_empty() {
        return Err(RegistryError::Validation(
            "at least one site id is required".into(),
        ));
    }
    let mut seen = HashSet::new();
    Ok(site_ids
        .iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect())
}
