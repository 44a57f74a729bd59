use serde::{Deserialize, Serialize};

use crate::Permission;

/// What a route demands of the current session.
///
/// Every route carries exactly one requirement. `Protected` always triggers an
/// authorization check: against the explicit permission when one is given,
/// otherwise against the policy's elevated roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthRequirement {
    /// Anyone may pass; a present session is refreshed opportunistically.
    Public,

    /// Only visitors without a valid session (login, registration).
    UnauthenticatedOnly,

    /// Any valid session.
    Authenticated,

    /// A valid session that also passes the access policy.
    Protected { permission: Option<Permission> },
}

impl AuthRequirement {
    pub fn protected(permission: impl Into<Permission>) -> Self {
        Self::Protected {
            permission: Some(permission.into()),
        }
    }

    pub fn elevated() -> Self {
        Self::Protected { permission: None }
    }

    pub fn permission(&self) -> Option<&Permission> {
        match self {
            Self::Protected { permission } => permission.as_ref(),
            Self::Public | Self::UnauthenticatedOnly | Self::Authenticated => None,
        }
    }
}

impl core::fmt::Display for AuthRequirement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::UnauthenticatedOnly => f.write_str("unauthenticated_only"),
            Self::Authenticated => f.write_str("authenticated"),
            Self::Protected { permission: Some(p) } => write!(f, "protected({p})"),
            Self::Protected { permission: None } => f.write_str("protected(elevated)"),
        }
    }
}
