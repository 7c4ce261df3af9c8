//! Tracing setup for AID binaries and tools.
//!
//! [`init_tracing`] installs the global subscriber: an `EnvFilter` honouring
//! `RUST_LOG`, plus either a human-readable or a JSON formatter. The global
//! subscriber can only be set once per process; later calls are no-ops.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `level` is the default verbosity when `RUST_LOG` is unset. With `json`,
/// lines are newline-delimited JSON. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
        tracing::info!(event = "telemetry.test", "still logging");
    }
}
