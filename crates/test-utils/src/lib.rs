//! Shared helpers for the collector's integration tests.

pub mod builders;
pub mod recording;

use std::sync::Once;
use std::time::Duration;

use taskstatus::logging::LOG_ENV;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Upper bound for any single awaited step in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test-writer subscriber once per test binary.
///
/// The filter comes from `TASKSTATUS_LOG` (same variable as the binary) and
/// defaults to `info`. Server output shows up next to a failing test.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("no result within {TEST_TIMEOUT:?}; server hung?"),
    }
}
