use std::path::PathBuf;
use std::process::Output;

use async_trait::async_trait;
use sitesync_types::IssuerEntryId;
use tokio::process::Command;
use tracing::debug;

use super::{ApplyRequest, IssuerClient, IssuerError, IssuerResult};

/// Drives a local `spire-server` binary over its admin socket.
#[derive(Clone, Debug)]
pub struct SpireCliIssuer {
    binary: PathBuf,
    socket_path: PathBuf,
}

impl SpireCliIssuer {
    pub fn new(binary: impl Into<PathBuf>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            socket_path: socket_path.into(),
        }
    }

    /// Arguments of `spire-server entry create` for `request`.
    pub fn create_args(&self, request: &ApplyRequest) -> Vec<String> {
        let mut args = vec![
            "entry".to_string(),
            "create".to_string(),
            "-socketPath".to_string(),
            self.socket_path.display().to_string(),
            "-spiffeID".to_string(),
            request.spiffe_id.to_string(),
            "-parentID".to_string(),
            request.parent_id.to_string(),
            "-x509SVIDTTL".to_string(),
            request.ttl.to_string(),
        ];
        for selector in &request.selectors {
            args.push("-selector".to_string());
            args.push(selector.to_string());
        }
        args
    }

    pub fn delete_args(&self, id: &IssuerEntryId) -> Vec<String> {
        vec![
            "entry".to_string(),
            "delete".to_string(),
            "-socketPath".to_string(),
            self.socket_path.display().to_string(),
            "-entryID".to_string(),
            id.to_string(),
        ]
    }

    async fn run(&self, args: &[String]) -> IssuerResult<Output> {
        debug!(binary = %self.binary.display(), ?args, "invoking spire-server");
        Ok(Command::new(&self.binary).args(args).output().await?)
    }
}

/// Pull the entry id out of `spire-server entry create` output, whose
/// records contain a line like `Entry ID         : 4a8c...`.
pub(crate) fn parse_entry_id(stdout: &str) -> Option<IssuerEntryId> {
    stdout.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let value = value.trim();
        (key.trim() == "Entry ID" && !value.is_empty()).then(|| IssuerEntryId::from(value))
    })
}

fn stderr_text(output: &Output) -> String {
    let text = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if text.is_empty() {
        format!("spire-server exited with {}", output.status)
    } else {
        text
    }
}

#[async_trait]
impl IssuerClient for SpireCliIssuer {
    async fn apply(&self, request: &ApplyRequest) -> IssuerResult<IssuerEntryId> {
        let output = self.run(&self.create_args(request)).await?;
        if !output.status.success() {
            return Err(IssuerError::Rejected(stderr_text(&output)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_entry_id(&stdout)
            .ok_or_else(|| IssuerError::Malformed("no Entry ID in create output".into()))
    }

    async fn revoke(&self, id: &IssuerEntryId) -> IssuerResult<()> {
        let output = self.run(&self.delete_args(id)).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = stderr_text(&output);
        if stderr.contains("NotFound") || stderr.contains("not found") {
            debug!(issuer_entry_id = %id, "entry already absent from issuer");
            return Ok(());
        }
        Err(IssuerError::Rejected(stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesync_types::{Selector, SpiffeId};

    fn request() -> ApplyRequest {
        ApplyRequest {
            spiffe_id: SpiffeId::parse("spiffe://example.org/web").unwrap(),
            parent_id: SpiffeId::parse("spiffe://example.org/node").unwrap(),
            selectors: vec![
                Selector::new("unix", "uid:1000"),
                Selector::new("k8s", "ns:prod"),
            ],
            ttl: 3600,
        }
    }

    #[test]
    fn builds_create_args() {
        let issuer = SpireCliIssuer::new("spire-server", "/tmp/api.sock");
        let args = issuer.create_args(&request());
        assert_eq!(&args[..4], &["entry", "create", "-socketPath", "/tmp/api.sock"]);
        assert!(args.windows(2).any(|w| w == ["-spiffeID", "spiffe://example.org/web"]));
        assert!(args.windows(2).any(|w| w == ["-x509SVIDTTL", "3600"]));
        let selectors: Vec<&String> = args
            .windows(2)
            .filter(|w| w[0] == "-selector")
            .map(|w| &w[1])
            .collect();
        assert_eq!(selectors, vec!["unix:uid:1000", "k8s:ns:prod"]);
    }

    #[test]
    fn builds_delete_args() {
        let issuer = SpireCliIssuer::new("spire-server", "/tmp/api.sock");
        let args = issuer.delete_args(&IssuerEntryId::from("abc"));
        assert_eq!(args.last().map(String::as_str), Some("abc"));
    }

    #[test]
    fn parses_entry_id() {
        let stdout = "Entry ID         : 7f1c0b2e-aaaa\nSPIFFE ID        : spiffe://example.org/web\n";
        assert_eq!(parse_entry_id(stdout), Some(IssuerEntryId::from("7f1c0b2e-aaaa")));
        assert_eq!(parse_entry_id("nothing here"), None);
    }

    #[tokio::test]
    async fn missing_binary_is_an_io_error() {
        let issuer = SpireCliIssuer::new("/nonexistent/spire-server", "/tmp/api.sock");
        let err = issuer.apply(&request()).await.unwrap_err();
        assert!(matches!(err, IssuerError::Io(_)));
    }
}
