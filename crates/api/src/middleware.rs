//! Per-request authentication/authorization gateway.
//!
//! Every request runs through [`gateway_middleware`], which asks
//! [`GatewayState::decide`] what to do and then applies the decision:
//! forward (possibly with an identity attached and cookies refreshed),
//! redirect to the login or error route, or reject outright.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};

use portcullis_auth::{AccessPolicy, AuthRequirement, AuthzError, Identity, Permission};
use portcullis_routes::{ConfigError, RouteArgs, RouteError, RouteRegistry};

use crate::config::GatewayConfig;
use crate::context::{IdentityContext, RouteContext};
use crate::errors::json_error;
use crate::identity::{ForwardedHeaders, IdentityClient, resolve_identity};
use crate::origin::{InvalidOrigin, OriginGuard};
use crate::session::{SessionAction, SessionState, SessionTracker};

/// Reason code carried to the error route as `r=<reason>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthorized,
    AlreadyLoggedIn,
    UndefinedRoute,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::AlreadyLoggedIn => "already_logged_in",
            Self::UndefinedRoute => "undefined_route",
        }
    }
}

/// What to do with the session cookies on the outgoing response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieUpdate {
    None,
    Refresh(String),
    Clear,
}

impl CookieUpdate {
    fn from_session(session: &SessionState) -> Self {
        match session.action {
            SessionAction::Set if session.present => Self::Refresh(session.value.clone()),
            SessionAction::Clear => Self::Clear,
            SessionAction::Set | SessionAction::Keep => Self::None,
        }
    }
}

/// Outcome of the gateway for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward untouched (HEAD/OPTIONS, server actions, unmatched paths).
    Bypass,
    /// Hard 403; no redirect and no cookie mutation.
    Reject(InvalidOrigin),
    RedirectToLogin { from: String, cookies: CookieUpdate },
    RedirectToError {
        reason: DenyReason,
        cookies: CookieUpdate,
    },
    Forward {
        route: RouteContext,
        identity: Option<Identity>,
        cookies: CookieUpdate,
    },
}

#[derive(Clone)]
pub struct GatewayState {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    registry: Arc<RouteRegistry>,
    identity: Arc<dyn IdentityClient>,
    tracker: SessionTracker,
    origins: OriginGuard,
    policy: AccessPolicy,
    identity_header: HeaderName,
    server_action_header: HeaderName,
    identity_timeout: Duration,
    login_path: String,
    error_path: String,
    strict_routes: bool,
}

impl GatewayState {
    /// Wire the gateway. Fails if the login or error route is not registered.
    pub fn new(
        config: &GatewayConfig,
        registry: Arc<RouteRegistry>,
        identity: Arc<dyn IdentityClient>,
    ) -> Result<Self, ConfigError> {
        let login_path = fixed_path(&registry, &config.login_route, "login_route")?;
        let error_path = fixed_path(&registry, &config.error_route, "error_route")?;

        let inner = GatewayInner {
            tracker: SessionTracker::from_config(config),
            origins: OriginGuard::from_config(config),
            policy: AccessPolicy::new(config.elevated_roles.iter().cloned()),
            identity_header: header_name(&config.identity_header, "identity_header")?,
            server_action_header: header_name(
                &config.server_action_header,
                "server_action_header",
            )?,
            identity_timeout: config.identity_timeout,
            login_path,
            error_path,
            strict_routes: config.strict_routes,
            registry,
            identity,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.inner.registry
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.inner.tracker
    }

    pub fn identity_header(&self) -> &HeaderName {
        &self.inner.identity_header
    }

    pub fn login_path(&self) -> &str {
        &self.inner.login_path
    }

    pub fn login_url(&self, from: &str) -> String {
        format!(
            "{}?from={}",
            self.inner.login_path,
            urlencoding::encode(from)
        )
    }

    pub fn error_url(&self, reason: DenyReason) -> String {
        format!("{}?r={}", self.inner.error_path, reason.as_str())
    }

    /// Run the auth state machine for one request.
    pub async fn decide(
        &self,
        method: &Method,
        target: &str,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Decision {
        let inner = &self.inner;

        if *method == Method::HEAD || *method == Method::OPTIONS {
            return Decision::Bypass;
        }
        if let Err(e) = inner.origins.check(headers) {
            return Decision::Reject(e);
        }
        if headers.contains_key(&inner.server_action_header) {
            return Decision::Bypass;
        }

        let Some(matched) = inner.registry.match_path(target) else {
            if inner.strict_routes {
                tracing::debug!(path = target, "no route matched");
                return Decision::RedirectToError {
                    reason: DenyReason::UndefinedRoute,
                    cookies: CookieUpdate::None,
                };
            }
            return Decision::Bypass;
        };
        let route = RouteContext::from(&matched);
        let session = inner.tracker.read(headers, now);
        tracing::debug!(
            route = matched.name(),
            requirement = %matched.requirement(),
            session = session.present,
            "route matched"
        );

        match matched.requirement() {
            AuthRequirement::Public => Decision::Forward {
                route,
                identity: None,
                cookies: CookieUpdate::from_session(&session),
            },
            AuthRequirement::UnauthenticatedOnly => {
                let Some(token) = session.token() else {
                    return Decision::Forward {
                        route,
                        identity: None,
                        cookies: CookieUpdate::from_session(&session),
                    };
                };
                match self.resolve(token, headers, now).await {
                    Some(_) => Decision::RedirectToError {
                        reason: DenyReason::AlreadyLoggedIn,
                        cookies: CookieUpdate::None,
                    },
                    // A dead session must not keep the visitor off the login page.
                    None => Decision::Forward {
                        route,
                        identity: None,
                        cookies: CookieUpdate::Clear,
                    },
                }
            }
            AuthRequirement::Authenticated => {
                match self.authenticate(&session, target, headers, now).await {
                    Ok(identity) => Decision::Forward {
                        route,
                        identity: Some(identity),
                        cookies: CookieUpdate::from_session(&session),
                    },
                    Err(decision) => decision,
                }
            }
            AuthRequirement::Protected { permission } => {
                let identity = match self.authenticate(&session, target, headers, now).await {
                    Ok(identity) => identity,
                    Err(decision) => return decision,
                };
                if let Err(e) = self.authorize(&identity, permission.as_ref()) {
                    tracing::info!(
                        route = matched.name(),
                        subject = %identity.subject,
                        "access denied: {e}"
                    );
                    return Decision::RedirectToError {
                        reason: DenyReason::Unauthorized,
                        cookies: CookieUpdate::None,
                    };
                }
                Decision::Forward {
                    route,
                    identity: Some(identity),
                    cookies: CookieUpdate::from_session(&session),
                }
            }
        }
    }

    /// Session must be present and resolve to an identity.
    async fn authenticate(
        &self,
        session: &SessionState,
        target: &str,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<Identity, Decision> {
        let Some(token) = session.token() else {
            return Err(Decision::RedirectToLogin {
                from: target.to_string(),
                cookies: CookieUpdate::from_session(session),
            });
        };
        self.resolve(token, headers, now)
            .await
            .ok_or(Decision::RedirectToError {
                reason: DenyReason::Unauthorized,
                cookies: CookieUpdate::Clear,
            })
    }

    fn authorize(
        &self,
        identity: &Identity,
        permission: Option<&Permission>,
    ) -> Result<(), AuthzError> {
        let result = self.inner.policy.authorize(identity, permission);
        if result.is_err() && tracing::enabled!(tracing::Level::DEBUG) {
            let explanation = self.inner.policy.explain(identity, permission);
            tracing::debug!(
                explanation = %serde_json::to_string(&explanation).unwrap_or_default(),
                "authorization explanation"
            );
        }
        result
    }

    async fn resolve(
        &self,
        token: &str,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Option<Identity> {
        let forwarded = ForwardedHeaders::from_request(headers);
        resolve_identity(
            self.inner.identity.as_ref(),
            token,
            &forwarded,
            self.inner.identity_timeout,
            now,
        )
        .await
    }

    fn apply_cookies(&self, headers: &mut HeaderMap, update: &CookieUpdate, now: DateTime<Utc>) {
        let tracker = &self.inner.tracker;
        match update {
            CookieUpdate::None => {}
            // Cookies written by the handler (login, logout) win over a refresh.
            CookieUpdate::Refresh(_) if tracker.is_written(headers) => {}
            CookieUpdate::Refresh(value) => tracker.apply(headers, value, now),
            CookieUpdate::Clear => tracker.clear(headers),
        }
    }

    fn attach_identity(&self, req: &mut Request<Body>, identity: Identity) {
        let encoded = serde_json::to_vec(&identity)
            .map_err(|e| e.to_string())
            .and_then(|json| HeaderValue::from_bytes(&json).map_err(|e| e.to_string()));
        match encoded {
            Ok(value) => {
                req.headers_mut()
                    .insert(self.inner.identity_header.clone(), value);
            }
            Err(e) => {
                tracing::warn!(subject = %identity.subject, "identity not forwarded as header: {e}")
            }
        }
        req.extensions_mut().insert(IdentityContext::new(identity));
    }
}

pub async fn gateway_middleware(
    State(state): State<GatewayState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let now = Utc::now();

    // Only the gateway may set the identity header.
    req.headers_mut().remove(state.identity_header());

    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let decision = state
        .decide(req.method(), &target, req.headers(), now)
        .await;

    match decision {
        Decision::Bypass => next.run(req).await,
        Decision::Reject(e) => {
            tracing::warn!(path = %target, "rejected cross-origin request: {e}");
            json_error(StatusCode::FORBIDDEN, "invalid_origin", e.to_string())
        }
        Decision::RedirectToLogin { from, cookies } => {
            let mut response = Redirect::temporary(&state.login_url(&from)).into_response();
            state.apply_cookies(response.headers_mut(), &cookies, now);
            response
        }
        Decision::RedirectToError { reason, cookies } => {
            tracing::debug!(path = %target, reason = reason.as_str(), "redirecting to error route");
            let mut response = Redirect::temporary(&state.error_url(reason)).into_response();
            state.apply_cookies(response.headers_mut(), &cookies, now);
            response
        }
        Decision::Forward {
            route,
            identity,
            cookies,
        } => {
            req.extensions_mut().insert(route);
            if let Some(identity) = identity {
                state.attach_identity(&mut req, identity);
            }
            let mut response = next.run(req).await;
            state.apply_cookies(response.headers_mut(), &cookies, now);
            response
        }
    }
}

fn fixed_path(
    registry: &RouteRegistry,
    name: &str,
    setting: &'static str,
) -> Result<String, ConfigError> {
    registry
        .reverse(name, &RouteArgs::new())
        .map_err(|e| match e {
            RouteError::NotFound(name) => ConfigError::MissingRoute(name),
            other => ConfigError::InvalidSetting {
                setting,
                reason: other.to_string(),
            },
        })
}

fn header_name(value: &str, setting: &'static str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(value.as_bytes()).map_err(|e| ConfigError::InvalidSetting {
        setting,
        reason: e.to_string(),
    })
}
