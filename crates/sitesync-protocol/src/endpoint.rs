/// HTTP endpoint paths served by the registry.
pub mod endpoints {
    pub const HEALTH: &str = "/health";

    pub const AGENT_POLL: &str = "/api/v1/agent/poll";
    pub const AGENT_REPORT: &str = "/api/v1/agent/report";
    pub const AGENT_POLL_DELETIONS: &str = "/api/v1/agent/poll-deletions";
    pub const AGENT_REPORT_DELETION: &str = "/api/v1/agent/report-deletion";

    pub const SITES: &str = "/api/v1/sites";
    pub const SITE: &str = "/api/v1/sites/:id";
    pub const ENTRIES: &str = "/api/v1/entries";
    pub const ENTRY: &str = "/api/v1/entries/:id";
    pub const ENTRY_SITES: &str = "/api/v1/entries/:id/sites";
    pub const ENTRY_STATUS: &str = "/api/v1/entries/:id/status";
    pub const AUDIT: &str = "/api/v1/audit";

    /// Header carrying the caller identity on mutating registry calls.
    pub const ACTOR_HEADER: &str = "x-actor";
}

/// Health check response.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_defaults() {
        let h = HealthResponse::default();
        assert_eq!(h.status, "ok");
        assert!(!h.version.is_empty());
    }

    #[test]
    fn agent_paths() {
        assert_eq!(endpoints::AGENT_POLL, "/api/v1/agent/poll");
        assert_eq!(endpoints::AGENT_REPORT_DELETION, "/api/v1/agent/report-deletion");
    }
}
