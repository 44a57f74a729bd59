//! HTTP gateway: session cookies, identity resolution and route access
//! enforcement in front of the dashboard's pages.

pub mod app;
pub mod config;
pub mod context;
pub mod errors;
pub mod identity;
pub mod middleware;
pub mod origin;
pub mod routes;
pub mod session;

pub use config::{Environment, GatewayConfig};
pub use middleware::{CookieUpdate, Decision, DenyReason, GatewayState, gateway_middleware};
