//! Tracing output for tests.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
///
/// Harness and service events use dotted targets (`harness.container`,
/// `cs.boot`), which the `harness` and `cs` directives match by prefix.
pub const DEFAULT_TEST_FILTER: &str =
    "harness=debug,cs=debug,customer_test_utils=debug,customer_service=debug,testcontainers=info";

static INIT: Once = Once::new();

/// Install a fmt subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
