//! Common test utilities.
//!
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// One second, in the milliseconds the expiring map takes.
pub const SEC: u64 = 1000;

static INIT: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per test binary.
///
/// Set `RUST_LOG=flashkv_core=trace` to watch the reclaimer.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Sleeps for `ms` milliseconds.
pub fn sleep_ms(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}
