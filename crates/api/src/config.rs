//! Gateway configuration.
//!
//! The gateway consumes configuration, it does not own it: values come from
//! `PORTCULLIS_*` environment variables with development-friendly defaults.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use portcullis_auth::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" | "local" => Ok(Self::Development),
            "prod" | "production" => Ok(Self::Production),
            other => bail!("unknown environment '{other}' (expected development or production)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: String,
    /// Public base URL of the dashboard; its origin is always allowed.
    pub base_url: String,
    pub environment: Environment,

    /// Base name of the session cookie pair.
    pub session_cookie: String,
    pub session_max_age: Duration,
    /// Rewrite cookies this long before the tracked expiry is reached.
    pub refresh_margin: Duration,

    /// Extra origins accepted by the same-origin guard.
    pub allowed_origins: Vec<String>,

    pub identity_url: String,
    pub identity_timeout: Duration,

    /// Header carrying the resolved identity to downstream handlers.
    pub identity_header: String,
    /// Marker header of framework-internal server actions (bypass auth).
    pub server_action_header: String,

    pub elevated_roles: Vec<Role>,
    pub login_route: String,
    pub error_route: String,
    /// Redirect unmatched paths to the error route instead of passing them through.
    pub strict_routes: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            base_url: "http://localhost:8080".to_string(),
            environment: Environment::Development,
            session_cookie: "portcullis_session".to_string(),
            session_max_age: Duration::from_secs(7 * 24 * 60 * 60),
            refresh_margin: Duration::ZERO,
            allowed_origins: Vec::new(),
            identity_url: "http://localhost:4000/v1/session".to_string(),
            identity_timeout: Duration::from_secs(10),
            identity_header: "x-portcullis-identity".to_string(),
            server_action_header: "x-server-action".to_string(),
            elevated_roles: vec![Role::new("admin")],
            login_route: "login".to_string(),
            error_route: "status".to_string(),
            strict_routes: false,
        }
    }
}

impl GatewayConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let secs = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            match get(key) {
                Some(raw) => raw
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| {
                        format!("{key} must be a whole number of seconds, got '{raw}'")
                    }),
                None => Ok(default),
            }
        };
        let list = |key: &str| -> Option<Vec<String>> {
            get(key).map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
        };

        let environment = match get("PORTCULLIS_ENV") {
            Some(raw) => raw.parse::<Environment>().context("PORTCULLIS_ENV")?,
            None => defaults.environment,
        };
        let strict_routes = match get("PORTCULLIS_STRICT_ROUTES") {
            Some(raw) => raw
                .parse::<bool>()
                .with_context(|| {
                    format!("PORTCULLIS_STRICT_ROUTES must be true or false, got '{raw}'")
                })?,
            None => defaults.strict_routes,
        };

        let config = Self {
            bind_addr: get("PORTCULLIS_BIND_ADDR").unwrap_or(defaults.bind_addr),
            base_url: get("PORTCULLIS_BASE_URL").unwrap_or(defaults.base_url),
            environment,
            session_cookie: get("PORTCULLIS_SESSION_COOKIE").unwrap_or(defaults.session_cookie),
            session_max_age: secs("PORTCULLIS_SESSION_MAX_AGE_SECS", defaults.session_max_age)?,
            refresh_margin: secs(
                "PORTCULLIS_SESSION_REFRESH_MARGIN_SECS",
                defaults.refresh_margin,
            )?,
            allowed_origins: list("PORTCULLIS_ALLOWED_ORIGINS").unwrap_or(defaults.allowed_origins),
            identity_url: get("PORTCULLIS_IDENTITY_URL").unwrap_or(defaults.identity_url),
            identity_timeout: secs(
                "PORTCULLIS_IDENTITY_TIMEOUT_SECS",
                defaults.identity_timeout,
            )?,
            identity_header: get("PORTCULLIS_IDENTITY_HEADER").unwrap_or(defaults.identity_header),
            server_action_header: get("PORTCULLIS_SERVER_ACTION_HEADER")
                .unwrap_or(defaults.server_action_header),
            elevated_roles: list("PORTCULLIS_ELEVATED_ROLES")
                .map(|roles| roles.into_iter().map(Role::new).collect())
                .unwrap_or(defaults.elevated_roles),
            login_route: get("PORTCULLIS_LOGIN_ROUTE").unwrap_or(defaults.login_route),
            error_route: get("PORTCULLIS_ERROR_ROUTE").unwrap_or(defaults.error_route),
            strict_routes,
        };

        if config.session_max_age.is_zero() {
            bail!("PORTCULLIS_SESSION_MAX_AGE_SECS must be greater than zero");
        }
        if config.refresh_margin >= config.session_max_age {
            tracing::warn!(
                margin = ?config.refresh_margin,
                max_age = ?config.session_max_age,
                "refresh margin not shorter than session lifetime; cookies rewritten every request"
            );
        }
        if config.is_production() && config.base_url.starts_with("http://") {
            tracing::warn!(base_url = %config.base_url, "production base URL is not https");
        }

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Session cookies carry `Secure` in production only.
    pub fn secure_cookies(&self) -> bool {
        self.is_production()
    }
}
