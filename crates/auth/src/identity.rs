use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{Permission, Role};

/// Identifier of the subject (account) an identity belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(Uuid);

impl SubjectId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for SubjectId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for SubjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Identity resolved for the current request.
///
/// Produced by the identity service from a session token, attached to the
/// forwarded request and discarded when the request completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Subject / account identifier.
    pub subject: SubjectId,

    /// Coarse role used for elevated-only routes.
    pub role: Role,

    /// Fine-grained permissions granted directly to the subject.
    #[serde(default)]
    pub permissions: Vec<Permission>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: bool,

    /// When the underlying session was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,

    /// When the underlying session stops being valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn new(subject: SubjectId, role: Role) -> Self {
        Self {
            subject,
            role,
            permissions: Vec::new(),
            email: None,
            email_verified: false,
            issued_at: None,
            expires_at: None,
        }
    }

    pub fn with_permissions<I>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        self.permissions.extend(permissions);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>, verified: bool) -> Self {
        self.email = Some(email.into());
        self.email_verified = verified;
        self
    }

    pub fn with_window(mut self, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        self.issued_at = Some(issued_at);
        self.expires_at = Some(expires_at);
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityWindowError {
    #[error("identity has expired")]
    Expired,

    #[error("identity not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid identity time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Check the identity's validity window against `now`.
///
/// Only the timestamps the identity service actually reported are checked;
/// an identity without timestamps is always within its window.
pub fn validate_identity_window(
    identity: &Identity,
    now: DateTime<Utc>,
) -> Result<(), IdentityWindowError> {
    if let (Some(issued_at), Some(expires_at)) = (identity.issued_at, identity.expires_at) {
        if expires_at <= issued_at {
            return Err(IdentityWindowError::InvalidTimeWindow);
        }
    }
    if let Some(issued_at) = identity.issued_at {
        if now < issued_at {
            return Err(IdentityWindowError::NotYetValid);
        }
    }
    if let Some(expires_at) = identity.expires_at {
        if now >= expires_at {
            return Err(IdentityWindowError::Expired);
        }
    }
    Ok(())
}
