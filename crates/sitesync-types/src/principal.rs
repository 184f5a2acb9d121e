use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const SCHEME: &str = "spiffe://";

/// A validated SPIFFE ID: `spiffe://<trust-domain>[/<path>]`.
///
/// Parsing enforces the scheme, a non-empty lowercase-safe trust domain, and
/// the absence of query strings and fragments. The original string is kept
/// verbatim so it round-trips to the issuer unchanged.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpiffeId {
    raw: String,
}

impl SpiffeId {
    pub fn parse(value: impl Into<String>) -> Result<Self, TypeError> {
        let raw = value.into();
        let invalid = |reason: &str| TypeError::InvalidSpiffeId {
            value: raw.clone(),
            reason: reason.into(),
        };

        let rest = raw
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("missing spiffe:// scheme"))?;
        let trust_domain = rest.split('/').next().unwrap_or_default();
        if trust_domain.is_empty() {
            return Err(invalid("empty trust domain"));
        }
        if !trust_domain
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_'))
        {
            return Err(invalid("trust domain has invalid characters"));
        }
        if rest.contains(['?', '#']) {
            return Err(invalid("query and fragment are not allowed"));
        }
        if rest.ends_with('/') {
            return Err(invalid("trailing slash"));
        }
        Ok(Self { raw })
    }

    pub fn trust_domain(&self) -> &str {
        self.raw[SCHEME.len()..].split('/').next().unwrap_or_default()
    }

    /// Path component including its leading `/`, or `""` for a bare domain.
    pub fn path(&self) -> &str {
        let rest = &self.raw[SCHEME.len()..];
        rest.find('/').map(|i| &rest[i..]).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.raw.starts_with(prefix)
    }
}

impl TryFrom<String> for SpiffeId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SpiffeId> for String {
    fn from(value: SpiffeId) -> Self {
        value.raw
    }
}

impl fmt::Debug for SpiffeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpiffeId({})", self.raw)
    }
}

impl fmt::Display for SpiffeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_workload_id() {
        let id = SpiffeId::parse("spiffe://example.org/ns/prod/sa/web").unwrap();
        assert_eq!(id.trust_domain(), "example.org");
        assert_eq!(id.path(), "/ns/prod/sa/web");
    }

    #[test]
    fn bare_trust_domain_has_empty_path() {
        let id = SpiffeId::parse("spiffe://example.org").unwrap();
        assert_eq!(id.path(), "");
    }

    #[test]
    fn rejects_bad_ids() {
        for bad in [
            "http://example.org/web",
            "spiffe:///web",
            "spiffe://Example.org/web",
            "spiffe://example.org/web?x=1",
            "spiffe://example.org/web/",
        ] {
            assert!(SpiffeId::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn deserialize_validates() {
        let ok: SpiffeId = serde_json::from_str("\"spiffe://td/a\"").unwrap();
        assert_eq!(ok.as_str(), "spiffe://td/a");
        assert!(serde_json::from_str::<SpiffeId>("\"td/a\"").is_err());
    }
}
