//! Structured logging setup.
//!
//! Everything in the workspace logs through `tracing` macros with structured
//! fields (`session_id`, counts, error kinds). Writing logs to files is the
//! embedding host's concern; this module only installs a stderr subscriber
//! for hosts that do not bring their own.

use tracing_subscriber::EnvFilter;

/// Level used when `debug` is enabled in settings.
pub const DEBUG_LEVEL: &str = "debug";

/// Level used otherwise.
pub const DEFAULT_LEVEL: &str = "warn";

/// Pick the subscriber level from the `debug` setting.
#[must_use]
pub fn level_for(debug: bool) -> &'static str {
    if debug { DEBUG_LEVEL } else { DEFAULT_LEVEL }
}

/// Initialize the global tracing subscriber with stderr output only.
///
/// Call once at startup. Subsequent calls are no-ops. `RUST_LOG` takes
/// precedence over `level`.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global default is already set
    let _ = subscriber.try_init();
}
