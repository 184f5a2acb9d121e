use sitesync_protocol::ApiError;

use crate::issuer::IssuerError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid agent configuration: {0}")]
    Config(String),

    #[error("failed to parse agent configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reconciliation API error: {0}")]
    Api(#[from] ApiError),

    #[error("issuer error: {0}")]
    Issuer(#[from] IssuerError),
}

pub type AgentResult<T> = Result<T, AgentError>;
