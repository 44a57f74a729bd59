use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier as reported by the identity service.
///
/// Roles are opaque strings at this layer; which roles count as elevated is a
/// policy decision (see [`crate::AccessPolicy`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison; role names come from an external service.
    pub fn matches(&self, other: &Role) -> bool {
        self.as_str().eq_ignore_ascii_case(other.as_str())
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Role {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}
