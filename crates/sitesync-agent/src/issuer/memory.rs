use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sitesync_types::IssuerEntryId;
use tracing::debug;

use super::{ApplyRequest, IssuerClient, IssuerError, IssuerResult};

/// An issuer that keeps registrations in memory and mints `spire-xxxxxxxx`
/// ids.
///
/// `apply` is idempotent on (principal, parent, selectors): re-applying an
/// already registered workload returns the existing id.
#[derive(Debug, Default)]
pub struct MemoryIssuer {
    entries: Mutex<HashMap<IssuerEntryId, ApplyRequest>>,
}

impl MemoryIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &IssuerEntryId) -> bool {
        self.entries
            .lock()
            .map(|e| e.contains_key(id))
            .unwrap_or_default()
    }

    fn mint(existing: &HashMap<IssuerEntryId, ApplyRequest>) -> IssuerEntryId {
        loop {
            let raw = uuid::Uuid::now_v7().simple().to_string();
            // The tail of a v7 uuid is random; the head is a timestamp.
            let id = IssuerEntryId::from(format!("spire-{}", &raw[raw.len() - 8..]));
            if !existing.contains_key(&id) {
                return id;
            }
        }
    }
}

#[async_trait]
impl IssuerClient for MemoryIssuer {
    async fn apply(&self, request: &ApplyRequest) -> IssuerResult<IssuerEntryId> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| IssuerError::Unavailable(e.to_string()))?;
        let existing = entries.iter().find(|(_, r)| {
            r.spiffe_id == request.spiffe_id
                && r.parent_id == request.parent_id
                && r.selectors == request.selectors
        });
        if let Some((id, _)) = existing {
            return Ok(id.clone());
        }
        let id = Self::mint(&entries);
        entries.insert(id.clone(), request.clone());
        debug!(issuer_entry_id = %id, spiffe_id = %request.spiffe_id, "registered entry");
        Ok(id)
    }

    async fn revoke(&self, id: &IssuerEntryId) -> IssuerResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| IssuerError::Unavailable(e.to_string()))?;
        if entries.remove(id).is_some() {
            debug!(issuer_entry_id = %id, "revoked entry");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesync_types::{Selector, SpiffeId};

    fn request(path: &str) -> ApplyRequest {
        ApplyRequest {
            spiffe_id: SpiffeId::parse(format!("spiffe://example.org/{path}")).unwrap(),
            parent_id: SpiffeId::parse("spiffe://example.org/node").unwrap(),
            selectors: vec![Selector::new("unix:uid", "1000")],
            ttl: 3600,
        }
    }

    #[tokio::test]
    async fn apply_is_idempotent_and_mints_spire_ids() {
        let issuer = MemoryIssuer::new();
        let first = issuer.apply(&request("web")).await.unwrap();
        let again = issuer.apply(&request("web")).await.unwrap();
        let other = issuer.apply(&request("db")).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert!(first.as_str().starts_with("spire-"));
        assert_eq!(first.as_str().len(), "spire-".len() + 8);
        assert_eq!(issuer.len(), 2);
    }

    #[tokio::test]
    async fn revoke_of_unknown_id_succeeds() {
        let issuer = MemoryIssuer::new();
        let id = issuer.apply(&request("web")).await.unwrap();
        issuer.revoke(&id).await.unwrap();
        issuer.revoke(&id).await.unwrap();
        assert!(issuer.is_empty());
    }
}
