use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sitesync_protocol::MAX_ENTRIES_LIMIT;
use sitesync_types::SiteId;

use crate::error::{AgentError, AgentResult};

pub const DEFAULT_API_SERVER: &str = "localhost:8081";
pub const DEFAULT_SPIRE_SOCKET: &str = "/tmp/spire-server/private/api.sock";

/// Which issuer adapter the agent drives.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum IssuerConfig {
    /// Self-contained issuer held in the agent's memory.
    #[default]
    Memory,
    /// A local `spire-server` binary talking to its admin socket.
    SpireCli {
        #[serde(default = "default_spire_binary")]
        binary: PathBuf,
        #[serde(default = "default_spire_socket")]
        socket_path: PathBuf,
    },
}

fn default_spire_binary() -> PathBuf {
    PathBuf::from("spire-server")
}

fn default_spire_socket() -> PathBuf {
    PathBuf::from(DEFAULT_SPIRE_SOCKET)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub site_id: String,
    pub site_name: String,
    /// `host:port` or a full `http://` URL of the registry.
    pub api_server_url: String,
    pub issuer: IssuerConfig,
    pub sync_interval_secs: u64,
    pub max_entries: u32,
    pub request_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            site_id: String::new(),
            site_name: String::new(),
            api_server_url: DEFAULT_API_SERVER.into(),
            issuer: IssuerConfig::Memory,
            sync_interval_secs: 10,
            max_entries: 10,
            request_timeout_secs: 30,
        }
    }
}

/// Values that take precedence over the config file, usually from flags
/// or the environment.
#[derive(Clone, Debug, Default)]
pub struct AgentOverrides {
    pub site_id: Option<String>,
    pub site_name: Option<String>,
    pub api_server_url: Option<String>,
    pub spire_socket_path: Option<PathBuf>,
    pub sync_interval_secs: Option<u64>,
    pub max_entries: Option<u32>,
}

impl AgentConfig {
    pub fn from_file(path: &Path) -> AgentResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AgentResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Layer `overrides` on top. A socket path switches the issuer to
    /// `spire-cli`, keeping any configured binary.
    pub fn with_overrides(mut self, overrides: AgentOverrides) -> Self {
        if let Some(site_id) = overrides.site_id {
            self.site_id = site_id;
        }
        if let Some(site_name) = overrides.site_name {
            self.site_name = site_name;
        }
        if let Some(url) = overrides.api_server_url {
            self.api_server_url = url;
        }
        if let Some(secs) = overrides.sync_interval_secs {
            self.sync_interval_secs = secs;
        }
        if let Some(max) = overrides.max_entries {
            self.max_entries = max;
        }
        if let Some(socket_path) = overrides.spire_socket_path {
            let binary = match self.issuer {
                IssuerConfig::SpireCli { binary, .. } => binary,
                IssuerConfig::Memory => default_spire_binary(),
            };
            self.issuer = IssuerConfig::SpireCli {
                binary,
                socket_path,
            };
        }
        self
    }

    pub fn validate(&self) -> AgentResult<()> {
        if self.site_id.trim().is_empty() {
            return Err(AgentError::Config("site_id is required".into()));
        }
        if self.sync_interval_secs == 0 {
            return Err(AgentError::Config(
                "sync_interval_secs must be positive".into(),
            ));
        }
        if self.max_entries == 0 || self.max_entries > MAX_ENTRIES_LIMIT {
            return Err(AgentError::Config(format!(
                "max_entries must be between 1 and {MAX_ENTRIES_LIMIT}"
            )));
        }
        if self.api_server_url.trim().is_empty() {
            return Err(AgentError::Config("api_server_url is required".into()));
        }
        Ok(())
    }

    pub fn site(&self) -> SiteId {
        SiteId::from(self.site_id.trim())
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.site_name.is_empty() {
            &self.site_id
        } else {
            &self.site_name
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL with a scheme, without a trailing slash.
    pub fn base_url(&self) -> String {
        let raw = self.api_server_url.trim().trim_end_matches('/');
        if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        }
    }
}
