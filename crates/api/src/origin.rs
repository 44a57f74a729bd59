//! Same-origin guard.
//!
//! Best-effort heuristic, not a CSRF defence: requests that name an origin
//! (via `Origin` or `Referer`) must name an allowed one. Requests carrying
//! neither header are treated as same-origin.

use axum::http::{HeaderMap, Uri, header};
use thiserror::Error;

use crate::config::GatewayConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{header} '{value}' is not an allowed origin")]
pub struct InvalidOrigin {
    pub header: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct OriginGuard {
    allowed: Vec<String>,
}

impl OriginGuard {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for origin in allowed {
            match normalize(origin.as_ref()) {
                Some(o) if !normalized.contains(&o) => normalized.push(o),
                Some(_) => {}
                None => {
                    tracing::warn!(
                        origin = origin.as_ref(),
                        "ignoring unparsable allowed origin"
                    )
                }
            }
        }
        Self {
            allowed: normalized,
        }
    }

    /// The base URL's origin plus the configured extra origins.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let extra = config.allowed_origins.iter().map(String::as_str);
        Self::new(std::iter::once(config.base_url.as_str()).chain(extra))
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    pub fn is_allowed(&self, value: &str) -> bool {
        normalize(value).is_some_and(|o| self.allowed.contains(&o))
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), InvalidOrigin> {
        for (name, label) in [(header::ORIGIN, "origin"), (header::REFERER, "referer")] {
            let Some(raw) = headers.get(&name) else {
                continue;
            };
            let value = String::from_utf8_lossy(raw.as_bytes()).into_owned();
            if !self.is_allowed(&value) {
                return Err(InvalidOrigin {
                    header: label,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// `scheme://host[:port]`, lower-cased, default ports dropped.
fn normalize(value: &str) -> Option<String> {
    let uri: Uri = value.trim().parse().ok()?;
    let scheme = uri.scheme_str()?.to_ascii_lowercase();
    let authority = uri.authority()?;
    let host = authority.host().to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }
    match (scheme.as_str(), authority.port_u16()) {
        ("http", Some(80)) | ("https", Some(443)) | (_, None) => Some(format!("{scheme}://{host}")),
        (_, Some(port)) => Some(format!("{scheme}://{host}:{port}")),
    }
}
