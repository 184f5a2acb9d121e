use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sitesync_protocol::{
    endpoints, Acknowledged, ApiError, ApiResult, DeletionEntry, DeletionPollResponse,
    PendingEntry, PollResponse, ReconciliationApi, ReportDeletionRequest, ReportRequest,
};
use sitesync_types::{ErrorKind, SiteId};

/// [`ReconciliationApi`] over the registry's HTTP endpoints.
///
/// Requests are blocking `ureq` calls moved onto tokio's blocking pool.
#[derive(Clone, Debug)]
pub struct HttpReconciliationClient {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpReconciliationClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T>(&self, path: &str, site_id: &SiteId, max_entries: u32) -> ApiResult<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = self
            .agent
            .get(&self.url(path))
            .query("site_id", site_id.as_str())
            .query("max_entries", &max_entries.to_string());
        blocking(move || decode(request.call())).await
    }

    async fn post<B, T>(&self, path: &str, body: B) -> ApiResult<T>
    where
        B: Serialize + Send + 'static,
        T: DeserializeOwned + Send + 'static,
    {
        let request = self.agent.post(&self.url(path));
        blocking(move || decode(request.send_json(body))).await
    }
}

async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("request task failed: {e}")))?
}

fn decode<T: DeserializeOwned>(result: Result<ureq::Response, ureq::Error>) -> ApiResult<T> {
    match result {
        Ok(response) => response
            .into_json::<T>()
            .map_err(|e| ApiError::transient(format!("failed to decode response: {e}"))),
        Err(ureq::Error::Status(code, response)) => Err(status_error(code, response)),
        Err(ureq::Error::Transport(transport)) => {
            Err(ApiError::transient(format!("transport error: {transport}")))
        }
    }
}

/// Prefer the server's `ApiError` body; fall back to classifying the status.
fn status_error(code: u16, response: ureq::Response) -> ApiError {
    let body = response.into_string().unwrap_or_default();
    if let Ok(err) = serde_json::from_str::<ApiError>(&body) {
        return err;
    }
    ApiError::new(kind_for_status(code), format!("HTTP {code}: {body}"))
}

pub(crate) fn kind_for_status(code: u16) -> ErrorKind {
    match code {
        404 => ErrorKind::NotFound,
        400 | 422 => ErrorKind::Validation,
        409 => ErrorKind::ConcurrencyConflict,
        500 => ErrorKind::Internal,
        _ => ErrorKind::TransientApplyFailure,
    }
}

#[async_trait]
impl ReconciliationApi for HttpReconciliationClient {
    async fn poll(&self, site_id: &SiteId, max_entries: u32) -> ApiResult<Vec<PendingEntry>> {
        let response: PollResponse = self
            .get(endpoints::AGENT_POLL, site_id, max_entries)
            .await?;
        Ok(response.entries)
    }

    async fn report(&self, report: ReportRequest) -> ApiResult<Acknowledged> {
        self.post(endpoints::AGENT_REPORT, report).await
    }

    async fn poll_deletions(
        &self,
        site_id: &SiteId,
        max_entries: u32,
    ) -> ApiResult<Vec<DeletionEntry>> {
        let response: DeletionPollResponse = self
            .get(endpoints::AGENT_POLL_DELETIONS, site_id, max_entries)
            .await?;
        Ok(response.entries)
    }

    async fn report_deletion(&self, report: ReportDeletionRequest) -> ApiResult<Acknowledged> {
        self.post(endpoints::AGENT_REPORT_DELETION, report).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(kind_for_status(404), ErrorKind::NotFound);
        assert_eq!(kind_for_status(400), ErrorKind::Validation);
        assert_eq!(kind_for_status(409), ErrorKind::ConcurrencyConflict);
        assert_eq!(kind_for_status(503), ErrorKind::TransientApplyFailure);
        assert_eq!(kind_for_status(502), ErrorKind::TransientApplyFailure);
    }

    #[test]
    fn trims_trailing_slash() {
        let client = HttpReconciliationClient::new("http://localhost:8081/", Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://localhost:8081");
        assert_eq!(client.url(endpoints::AGENT_POLL), "http://localhost:8081/api/v1/agent/poll");
    }

    #[tokio::test]
    async fn unreachable_server_is_transient() {
        // Port 9 (discard) on localhost is closed on test machines.
        let client = HttpReconciliationClient::new("http://127.0.0.1:9", Duration::from_secs(2));
        let err = client.poll(&SiteId::from("a"), 10).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransientApplyFailure);
    }
}
