use std::sync::Once;

use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::{EnvFilter, prelude::*};

static INIT: Once = Once::new();

/// Installs the global subscriber once per process. `RUST_LOG` wins over
/// `default_level`.
pub fn init_logging(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        // Test binaries may already carry a subscriber
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_fmt::layer().with_test_writer())
            .try_init();
    });
}
