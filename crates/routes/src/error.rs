//! Registry error model.

use thiserror::Error;

/// Startup-time configuration failure. Fatal: nothing is served until it is
/// fixed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("route name must not be empty")]
    EmptyName,

    #[error("route '{name}' has an empty path template")]
    EmptyTemplate { name: String },

    #[error("route '{0}' is already registered")]
    DuplicateName(String),

    #[error("invalid path template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("required route '{0}' is not registered")]
    MissingRoute(String),

    #[error("invalid setting '{setting}': {reason}")]
    InvalidSetting {
        setting: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid_template(template: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}

/// Reverse URL generation failure.
///
/// These are programmer errors (asking for a route that was never registered,
/// or passing arguments that do not fit its template).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("route '{0}' not found")]
    NotFound(String),

    #[error("template '{template}' needs argument '{param}'")]
    MissingParam { template: String, param: String },

    #[error("argument '{param}' for template '{template}' must not be empty")]
    EmptyParam { template: String, param: String },

    #[error("argument '{param}' for template '{template}' must be a single segment")]
    ArgumentKind { template: String, param: String },

    #[error("template '{0}' contains a wildcard and cannot be generated")]
    NotGeneratable(String),
}
