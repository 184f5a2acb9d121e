use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Attestation key/value pair the issuer uses to bind a principal to a
/// workload, e.g. `unix:uid` = `1000`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Selector {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Selector {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    /// Parse the `type:value` form used on command lines. The type is
    /// everything before the first `:`; the value may itself contain `:`.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| TypeError::InvalidSelector(format!("expected type:value, got {s:?}")))?;
        let selector = Self::new(kind, value);
        selector.validate()?;
        Ok(selector)
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        if self.kind.trim().is_empty() {
            return Err(TypeError::InvalidSelector("selector type is empty".into()));
        }
        if self.value.trim().is_empty() {
            return Err(TypeError::InvalidSelector(format!(
                "selector {} has an empty value",
                self.kind
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({}:{})", self.kind, self.value)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}
