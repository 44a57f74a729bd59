use portcullis_auth::Identity;
use portcullis_routes::{Params, RouteMatch};

/// Identity resolved by the gateway for this request.
///
/// Only present on routes that required one (`Authenticated`/`Protected`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    identity: Identity,
}

impl IdentityContext {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

/// The registry route this request matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteContext {
    name: String,
    params: Params,
}

impl RouteContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

impl From<&RouteMatch<'_>> for RouteContext {
    fn from(value: &RouteMatch<'_>) -> Self {
        Self {
            name: value.name().to_string(),
            params: value.params().clone(),
        }
    }
}
