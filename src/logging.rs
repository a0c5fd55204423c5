//! Tracing subscriber setup

use crate::config::Verbosity;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `verbosity`
///
/// `RUST_LOG` overrides the derived filter. Returns `false` if a global subscriber was
/// already installed, which is not an error.
pub fn init(verbosity: Verbosity) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
