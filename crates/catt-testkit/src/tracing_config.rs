//! Tracing setup for tests.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `info,catt_core=debug`.
pub fn init_test_tracing() {
    init_test_tracing_with_filter("info,catt_core=debug");
}

/// Like [`init_test_tracing`], but with an explicit default filter that
/// `RUST_LOG` still overrides.
pub fn init_test_tracing_with_filter(default_filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        // Another harness may already own the global subscriber.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .compact(),
            )
            .try_init();
    });
}
