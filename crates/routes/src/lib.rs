//! `portcullis-routes` — named route table with compiled path templates.
//!
//! Templates use `:param` for one path segment, `:param*` for the rest of the
//! path and a bare `*` for "anything". The registry is built once at startup
//! and is read-only afterwards.

pub mod error;
pub mod pattern;
pub mod registry;

pub use error::{ConfigError, RouteError};
pub use pattern::{ParamValue, Params, PathPattern, RouteArgs};
pub use registry::{
    GroupDefaults, RouteDefinition, RouteGroup, RouteMatch, RouteProps, RouteRegistry,
    RouteRegistryBuilder,
};
