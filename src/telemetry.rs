//! Structured logging setup
//!
//! Configures tracing-subscriber with an `EnvFilter`. `RUST_LOG` wins when
//! set; otherwise the configured level applies to this crate and HTTP
//! request spans from tower-http are logged at info.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Default filter directive for a configured log level
pub fn default_directive(level: &str) -> String {
    format!("formatter_relay={level},tower_http=info")
}

/// Initialize the global tracing subscriber
///
/// Only the first call per process has an effect.
///
/// ```no_run
/// formatter_relay::telemetry::init("info");
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(default_level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            let directive = default_directive(level);
            assert!(directive.starts_with(&format!("formatter_relay={level}")));
            assert!(EnvFilter::try_new(&directive).is_ok());
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        init("debug");
        init("info");
    }
}
