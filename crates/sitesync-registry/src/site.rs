use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitesync_types::SiteId;

use crate::error::{RegistryError, RegistryResult};

/// Operational state of a site.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    #[default]
    Active,
    Inactive,
    Maintenance,
}

impl SiteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(RegistryError::Validation(format!(
                "unknown site status: {other}"
            ))),
        }
    }
}

/// A remote location that runs an agent and a local issuer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    #[serde(default)]
    pub region: String,
    /// Address of the site's issuer, informational only.
    #[serde(default)]
    pub spire_server_address: String,
    #[serde(default)]
    pub trust_domain: String,
    #[serde(default)]
    pub status: SiteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl Site {
    pub fn new(id: impl Into<SiteId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            region: String::new(),
            spire_server_address: String::new(),
            trust_domain: String::new(),
            status: SiteStatus::Active,
            last_sync_at: None,
        }
    }
}

/// Registered sites. Read-mostly; the only hot write is `touch_last_sync`.
pub trait SiteDirectory: Send + Sync {
    fn register(&self, site: Site) -> RegistryResult<()>;

    fn get(&self, id: &SiteId) -> RegistryResult<Option<Site>>;

    /// Sites sorted by name, optionally restricted to one status.
    fn list(&self, status: Option<SiteStatus>) -> RegistryResult<Vec<Site>>;

    /// Record a successful sync from the site's agent.
    fn touch_last_sync(&self, id: &SiteId, at: DateTime<Utc>) -> RegistryResult<()>;
}

/// Site directory held in memory, seeded at startup.
#[derive(Debug, Default)]
pub struct InMemorySiteDirectory {
    sites: RwLock<HashMap<SiteId, Site>>,
}

impl InMemorySiteDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sites(sites: impl IntoIterator<Item = Site>) -> RegistryResult<Self> {
        let dir = Self::new();
        for site in sites {
            dir.register(site)?;
        }
        Ok(dir)
    }
}

impl SiteDirectory for InMemorySiteDirectory {
    fn register(&self, site: Site) -> RegistryResult<()> {
        let mut sites = self
            .sites
            .write()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        if sites.contains_key(&site.id) {
            return Err(RegistryError::DuplicateSite(site.id));
        }
        sites.insert(site.id.clone(), site);
        Ok(())
    }

    fn get(&self, id: &SiteId) -> RegistryResult<Option<Site>> {
        let sites = self
            .sites
            .read()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        Ok(sites.get(id).cloned())
    }

    fn list(&self, status: Option<SiteStatus>) -> RegistryResult<Vec<Site>> {
        let sites = self
            .sites
            .read()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        let mut out: Vec<Site> = sites
            .values()
            .filter(|s| status.map_or(true, |want| s.status == want))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    fn touch_last_sync(&self, id: &SiteId, at: DateTime<Utc>) -> RegistryResult<()> {
        let mut sites = self
            .sites
            .write()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        let site = sites
            .get_mut(id)
            .ok_or_else(|| RegistryError::SiteNotFound(id.clone()))?;
        site.last_sync_at = Some(at);
        Ok(())
    }
}
