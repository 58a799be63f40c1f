//! Millisecond Clocks
//!
//! The expiring map measures every deadline in whole milliseconds on a
//! monotonic timeline. This module provides that timeline as a small trait so
//! the map can run against the real clock in production and a hand-driven
//! clock in tests.
//!
//! ## Example
//!
//! ```
//! use flashkv_core::clock::{Clock, ManualClock};
//!
//! let clock = ManualClock::new();
//! assert_eq!(clock.now_ms(), 0);
//!
//! clock.advance_ms(250);
//! assert_eq!(clock.now_ms(), 250);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A source of monotonic milliseconds.
///
/// Values must never go backwards. The origin is arbitrary: only differences
/// between two readings of the same clock are meaningful.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// The default clock, backed by [`Instant`].
///
/// Reports milliseconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// give another to an [`ExpiringMap`](crate::storage::ExpiringMap).
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock starting at 0ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock starting at the given time.
    pub fn starting_at(ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(ms)),
        }
    }

    /// Moves the clock forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Moves the clock forward by a [`Duration`], truncated to milliseconds.
    pub fn advance(&self, by: Duration) {
        self.advance_ms(by.as_millis() as u64);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let first = clock.now_ms();

        std::thread::sleep(Duration::from_millis(20));

        let second = clock.now_ms();
        assert!(second >= first + 20);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::starting_at(100);
        let handle = clock.clone();

        handle.advance_ms(50);
        assert_eq!(clock.now_ms(), 150);

        clock.advance(Duration::from_secs(1));
        assert_eq!(handle.now_ms(), 1150);
    }
}
