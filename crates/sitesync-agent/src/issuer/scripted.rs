use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sitesync_types::{IssuerEntryId, SpiffeId};

use super::{ApplyRequest, IssuerClient, IssuerError, IssuerResult, MemoryIssuer};

#[derive(Debug, Default)]
struct Script {
    fail_principals: HashSet<SpiffeId>,
    fail_revokes: HashSet<IssuerEntryId>,
    /// Outcomes for the next applies, consumed front to back. `true` fails.
    apply_queue: VecDeque<bool>,
    applied: Vec<SpiffeId>,
    revoked: Vec<IssuerEntryId>,
}

/// Issuer test double that fails chosen calls and records every call.
///
/// Calls that are not scripted to fail are delegated to a [`MemoryIssuer`].
#[derive(Debug, Default)]
pub struct ScriptedIssuer {
    inner: MemoryIssuer,
    script: Mutex<Script>,
    delay: Option<Duration>,
}

impl ScriptedIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every call, to model a slow issuer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every apply for this principal until cleared.
    pub fn fail_principal(&self, spiffe_id: &SpiffeId) {
        self.edit(|s| {
            s.fail_principals.insert(spiffe_id.clone());
        });
    }

    pub fn clear_failures(&self) {
        self.edit(|s| {
            s.fail_principals.clear();
            s.fail_revokes.clear();
            s.apply_queue.clear();
        });
    }

    /// Fail the next `n` applies, whatever they are.
    pub fn fail_next_applies(&self, n: usize) {
        self.edit(|s| s.apply_queue.extend(std::iter::repeat(true).take(n)));
    }

    pub fn fail_revoke(&self, id: &IssuerEntryId) {
        self.edit(|s| {
            s.fail_revokes.insert(id.clone());
        });
    }

    /// Principals of every apply attempt, in call order.
    pub fn applied(&self) -> Vec<SpiffeId> {
        self.view(|s| s.applied.clone())
    }

    /// Ids of every revoke attempt, in call order.
    pub fn revoked(&self) -> Vec<IssuerEntryId> {
        self.view(|s| s.revoked.clone())
    }

    pub fn registrations(&self) -> usize {
        self.inner.len()
    }

    fn edit(&self, f: impl FnOnce(&mut Script)) {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut script);
    }

    fn view<T>(&self, f: impl FnOnce(&Script) -> T) -> T {
        let script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        f(&script)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl IssuerClient for ScriptedIssuer {
    async fn apply(&self, request: &ApplyRequest) -> IssuerResult<IssuerEntryId> {
        let fail = {
            let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
            script.applied.push(request.spiffe_id.clone());
            let queued = script.apply_queue.pop_front().unwrap_or(false);
            queued || script.fail_principals.contains(&request.spiffe_id)
        };
        self.pause().await;
        if fail {
            return Err(IssuerError::Unavailable(format!(
                "scripted failure for {}",
                request.spiffe_id
            )));
        }
        self.inner.apply(request).await
    }

    async fn revoke(&self, id: &IssuerEntryId) -> IssuerResult<()> {
        let fail = {
            let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
            script.revoked.push(id.clone());
            script.fail_revokes.contains(id)
        };
        self.pause().await;
        if fail {
            return Err(IssuerError::Unavailable(format!("scripted failure for {id}")));
        }
        self.inner.revoke(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesync_types::Selector;

    fn request(path: &str) -> ApplyRequest {
        ApplyRequest {
            spiffe_id: SpiffeId::parse(format!("spiffe://example.org/{path}")).unwrap(),
            parent_id: SpiffeId::parse("spiffe://example.org/node").unwrap(),
            selectors: vec![Selector::new("unix:uid", "1000")],
            ttl: 60,
        }
    }

    #[tokio::test]
    async fn scripted_failures() {
        let issuer = ScriptedIssuer::new();
        issuer.fail_next_applies(1);
        assert!(issuer.apply(&request("a")).await.is_err());
        assert!(issuer.apply(&request("a")).await.is_ok());

        let bad = request("b");
        issuer.fail_principal(&bad.spiffe_id);
        assert!(issuer.apply(&bad).await.is_err());
        issuer.clear_failures();
        let id = issuer.apply(&bad).await.unwrap();

        issuer.fail_revoke(&id);
        assert!(issuer.revoke(&id).await.is_err());
        assert_eq!(issuer.applied().len(), 4);
        assert_eq!(issuer.revoked(), vec![id]);
        assert_eq!(issuer.registrations(), 2);
    }
}
