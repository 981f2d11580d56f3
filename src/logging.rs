//! Process-level tracing setup shared by `imeta` and `icat`.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

use crate::config::LOG_ENV;

static INIT: OnceLock<()> = OnceLock::new();

/// Install a stderr subscriber filtered by `IMETA_LOG` (default `warn`).
///
/// Safe to call repeatedly; only the first call has an effect. Scenarios
/// assert on stderr, so the default level stays quiet.
pub fn init() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
