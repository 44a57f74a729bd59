//! Process-wide tracing setup shared by the gateway binary and tools.

/// Tracing subscriber configuration (filters, output format).
pub mod tracing;

pub use tracing::LogFormat;

/// Initialize tracing from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}
