//! Tracing subscriber setup.
//!
//! The crate logs through `tracing` throughout; binaries and tests that
//! want to see that output can call [`try_init`] once at startup. Filtering
//! follows the standard `RUST_LOG` environment variable, defaulting to
//! `info`.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a formatted subscriber honoring `RUST_LOG`.
///
/// Returns `false` when a global subscriber was already set (common in
/// test binaries); that case is not an error.
pub fn try_init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Install a formatted subscriber, panicking if one is already set.
///
/// Prefer [`try_init`] anywhere more than one initialization site can run.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}
