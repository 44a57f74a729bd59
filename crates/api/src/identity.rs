//! Identity service boundary.
//!
//! The gateway exchanges a session token for an [`Identity`] on every request
//! that needs one. Implementations report "no such identity" and "lookup
//! failed" separately; [`resolve_identity`] collapses both to `None`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use portcullis_auth::{Identity, validate_identity_window};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityLookupError {
    #[error("identity service unreachable: {0}")]
    Transport(String),

    #[error("identity service answered with status {0}")]
    Status(u16),

    #[error("malformed identity response: {0}")]
    Decode(String),

    #[error("identity lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Upstream request headers passed through to the identity service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardedHeaders(Vec<(HeaderName, HeaderValue)>);

impl ForwardedHeaders {
    pub fn from_request(headers: &HeaderMap) -> Self {
        let names = [
            header::USER_AGENT,
            header::ACCEPT_LANGUAGE,
            HeaderName::from_static("x-forwarded-for"),
            HeaderName::from_static("x-real-ip"),
        ];
        let forwarded = names
            .into_iter()
            .filter_map(|name| headers.get(&name).cloned().map(|value| (name, value)))
            .collect();
        Self(forwarded)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.0.iter().map(|(n, v)| (n, v))
    }
}

#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// `Ok(None)` means the service rejected the token.
    async fn lookup(
        &self,
        token: &str,
        forwarded: &ForwardedHeaders,
    ) -> Result<Option<Identity>, IdentityLookupError>;
}

/// Resolve the identity for `token`, bounded by `timeout`.
///
/// Never fails: timeouts, transport errors, rejected tokens and identities
/// outside their validity window all come back as `None`.
pub async fn resolve_identity(
    client: &dyn IdentityClient,
    token: &str,
    forwarded: &ForwardedHeaders,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Option<Identity> {
    let lookup = client.lookup(token, forwarded);
    let result = match tokio::time::timeout(timeout, lookup).await {
        Ok(result) => result,
        Err(_) => Err(IdentityLookupError::Timeout(timeout)),
    };

    match result {
        Ok(Some(identity)) => match validate_identity_window(&identity, now) {
            Ok(()) => Some(identity),
            Err(e) => {
                tracing::debug!(subject = %identity.subject, "identity discarded: {e}");
                None
            }
        },
        Ok(None) => {
            tracing::debug!("session token rejected by identity service");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "identity lookup failed");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Identity>,
    #[serde(default)]
    message: Option<String>,
}

/// Identity service client over HTTP.
///
/// One `GET` per lookup with bearer authorization. The service answers with a
/// `{ success, data, message }` envelope.
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpIdentityClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            timeout,
        })
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    async fn lookup(
        &self,
        token: &str,
        forwarded: &ForwardedHeaders,
    ) -> Result<Option<Identity>, IdentityLookupError> {
        let mut request = self
            .http
            .get(&self.endpoint)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json");
        for (name, value) in forwarded.iter() {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                IdentityLookupError::Timeout(self.timeout)
            } else {
                IdentityLookupError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if matches!(
            status,
            reqwest::StatusCode::UNAUTHORIZED
                | reqwest::StatusCode::FORBIDDEN
                | reqwest::StatusCode::NOT_FOUND
        ) {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(IdentityLookupError::Status(status.as_u16()));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| IdentityLookupError::Decode(e.to_string()))?;

        if !envelope.success {
            tracing::debug!(message = ?envelope.message, "identity service declined token");
            return Ok(None);
        }
        envelope
            .data
            .map(Some)
            .ok_or_else(|| IdentityLookupError::Decode("success response without data".to_string()))
    }
}

/// Token → identity table for development and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityClient {
    identities: HashMap<String, Identity>,
    latency: Option<Duration>,
    unavailable: bool,
}

impl InMemoryIdentityClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.identities.insert(token.into(), identity);
        self
    }

    /// Delay every lookup (exercises the gateway timeout).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every lookup as if the service were down.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

#[async_trait]
impl IdentityClient for InMemoryIdentityClient {
    async fn lookup(
        &self,
        token: &str,
        _forwarded: &ForwardedHeaders,
    ) -> Result<Option<Identity>, IdentityLookupError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable {
            return Err(IdentityLookupError::Transport(
                "identity service unavailable".to_string(),
            ));
        }
        Ok(self.identities.get(token).cloned())
    }
}
