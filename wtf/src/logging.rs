//! Development-time tracing for the driver.
//!
//! Tracing is diagnostics only and goes to stderr. Product output (plan
//! listings, package names, run summaries) is printed to stdout by the
//! binary, and per-variant collaborator logs live in the working area.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `wtf=info,warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=wtf=debug wtf run gnu.wtf
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wtf=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
