//! `portcullis-auth` — identity and access model for the request gateway.
//!
//! This crate is intentionally decoupled from HTTP, cookies and the identity
//! service transport. It only answers "who is this" and "may they pass".

pub mod authorize;
pub mod identity;
pub mod permissions;
pub mod requirement;
pub mod roles;

pub use authorize::{AccessPolicy, AuthzError};
pub use identity::{Identity, IdentityWindowError, SubjectId, validate_identity_window};
pub use permissions::Permission;
pub use requirement::AuthRequirement;
pub use roles::Role;
