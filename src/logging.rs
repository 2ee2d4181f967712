//! Logging bootstrap
//!
//! Every nerve crate logs through `tracing`. Applications that do not install
//! their own subscriber can call [`init`] once at startup; the filter is read
//! from the `NERVE_LOG` environment variable using `EnvFilter` syntax
//! (`NERVE_LOG=nerve_engine=debug,warn`).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "NERVE_LOG";

/// Install a formatting subscriber filtered by `NERVE_LOG` (default `warn`).
///
/// Returns `false` if a global subscriber was already installed.
pub fn init() -> bool {
    init_with_default("warn")
}

/// Same as [`init`] with a caller-chosen fallback filter.
pub fn init_with_default(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
