use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sitesync_protocol::{DEFAULT_MAX_ENTRIES, MAX_ENTRIES_LIMIT};
use sitesync_reconcile::{ReconcileSettings, DEFAULT_FAILED_RETRY_AFTER_SECS};
use sitesync_registry::{Site, SiteStatus};
use sitesync_types::SiteId;

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub default_poll_limit: u32,
    pub max_poll_limit: u32,
    pub failed_retry_after_secs: u64,
    /// Sites registered at startup.
    pub sites: Vec<SiteSeed>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            default_poll_limit: DEFAULT_MAX_ENTRIES,
            max_poll_limit: MAX_ENTRIES_LIMIT,
            failed_retry_after_secs: DEFAULT_FAILED_RETRY_AFTER_SECS,
            sites: Vec::new(),
        }
    }
}

/// A site as written in the config file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub spire_server_address: String,
    #[serde(default)]
    pub trust_domain: String,
    #[serde(default)]
    pub status: SiteStatus,
}

impl From<&SiteSeed> for Site {
    fn from(seed: &SiteSeed) -> Self {
        Site {
            id: SiteId::from(seed.id.trim()),
            name: seed.name.clone(),
            region: seed.region.clone(),
            spire_server_address: seed.spire_server_address.clone(),
            trust_domain: seed.trust_domain.clone(),
            status: seed.status,
            last_sync_at: None,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ServerResult<Self> {
        toml::from_str(content).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.max_poll_limit == 0 || self.max_poll_limit > MAX_ENTRIES_LIMIT {
            return Err(ServerError::Config(format!(
                "max_poll_limit must be between 1 and {MAX_ENTRIES_LIMIT}"
            )));
        }
        if self.default_poll_limit == 0 || self.default_poll_limit > self.max_poll_limit {
            return Err(ServerError::Config(
                "default_poll_limit must be between 1 and max_poll_limit".into(),
            ));
        }
        let mut seen = HashSet::new();
        for site in &self.sites {
            let id = site.id.trim();
            if id.is_empty() {
                return Err(ServerError::Config("site id must not be empty".into()));
            }
            if !seen.insert(id) {
                return Err(ServerError::Config(format!("duplicate site id: {id}")));
            }
        }
        Ok(())
    }

    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            failed_retry_after_secs: self.failed_retry_after_secs,
            default_poll_limit: self.default_poll_limit,
            max_poll_limit: self.max_poll_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8081".parse::<SocketAddr>().unwrap());
        assert_eq!(c.default_poll_limit, 10);
        assert_eq!(c.max_poll_limit, 100);
        assert_eq!(c.failed_retry_after_secs, 60);
        assert!(c.sites.is_empty());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn loads_sites_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bind_addr = "0.0.0.0:9000"
failed_retry_after_secs = 5

[[sites]]
id = "us-east"
name = "US East"
trust_domain = "east.example.org"

[[sites]]
id = "eu-west"
name = "EU West"
status = "maintenance"
"#
        )
        .unwrap();
        let c = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.sites.len(), 2);
        assert_eq!(c.sites[1].status, SiteStatus::Maintenance);
        assert_eq!(c.reconcile_settings().failed_retry_after_secs, 5);
        let site = Site::from(&c.sites[0]);
        assert_eq!(site.id, SiteId::from("us-east"));
        assert_eq!(site.status, SiteStatus::Active);
    }

    #[test]
    fn validation_rejects_bad_limits_and_duplicate_sites() {
        let bad_limit = ServerConfig {
            max_poll_limit: 500,
            ..ServerConfig::default()
        };
        assert!(bad_limit.validate().is_err());

        let seed = SiteSeed {
            id: "a".into(),
            name: "A".into(),
            region: String::new(),
            spire_server_address: String::new(),
            trust_domain: String::new(),
            status: SiteStatus::Active,
        };
        let dup = ServerConfig {
            sites: vec![seed.clone(), seed],
            ..ServerConfig::default()
        };
        assert!(matches!(dup.validate(), Err(ServerError::Config(_))));
    }
}
