//! Logging initialisation.

use tracing_subscriber::EnvFilter;

/// The filter for a CLI verbosity count: warn, info, debug, then trace.
pub fn filter_for_verbosity(verbose: u8) -> EnvFilter {
    match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Returns `false` when a subscriber was already installed, e.g. by an
/// earlier test.
pub fn init(default_filter: EnvFilter, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or(default_filter);
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
