use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier, rejecting blank input.
            pub fn parse(raw: impl Into<String>) -> Result<Self, TypeError> {
                let raw = raw.into();
                if raw.trim().is_empty() {
                    return Err(TypeError::EmptyIdentifier);
                }
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Opaque unique key of a workload entry.
    EntryId
);

string_id!(
    /// Identifier of a registered site.
    SiteId
);

string_id!(
    /// Identifier the local issuer assigned when it applied an entry.
    IssuerEntryId
);

string_id!(
    /// Caller identity recorded on every mutation and audit record.
    Actor
);

impl EntryId {
    /// Fresh time-ordered identifier (UUID v7).
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
}

impl Actor {
    pub fn anonymous() -> Self {
        Self("anonymous".into())
    }

    /// Synthetic identity used when a site agent reports on its own behalf.
    pub fn site_agent(site: &SiteId) -> Self {
        Self(format!("site-agent-{site}"))
    }
}
