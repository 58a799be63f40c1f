//! Background Reclaimer
//!
//! This module implements the dedicated worker thread that physically removes
//! expired entries from an [`ExpiringMap`](crate::storage::ExpiringMap).
//! Reads already hide expired entries ("lazy expiry"); the reclaimer makes
//! sure memory is returned even for keys nobody reads again.
//!
//! ## Design
//!
//! Unlike a periodic sweeper, the reclaimer never scans the table. It sleeps
//! until the earliest known deadline and wakes only when there is work:
//!
//! 1. Lock the map and replay the pending timeout log into the deadline index
//! 2. Nothing indexed: exit if shutting down, otherwise wait for a signal.
//!    With [`ShutdownMode::Immediate`] the reclaimer instead exits as soon as
//!    it sees the flag, after reclaiming whatever is already due
//! 3. Earliest deadline in the future: wait until then (or until signalled)
//! 4. Otherwise remove up to `max_reclaim_buckets` expired deadline buckets,
//!    release the lock, and start over
//!
//! Every wake-up re-reads the shared state from the top, so early and
//! spurious wake-ups are harmless.
//!
//! ## Wake-ups
//!
//! Foreground writers signal the reclaimer when a `put` lands before the
//! earliest indexed deadline (or nothing is indexed yet), when the pending log
//! reaches its high water mark, and on shutdown.

use crate::clock::Clock;
use crate::storage::engine::{Shared, State};
use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Default cap on deadline buckets reclaimed per lock acquisition.
pub const DEFAULT_MAX_RECLAIM_BUCKETS: usize = 10;

/// Default pending log length that forces an early drain.
pub const DEFAULT_PENDING_LOG_HIGH_WATER: usize = 4096;

/// Errors raised while starting or stopping the reclaimer.
#[derive(Debug, Error)]
pub enum ExpiryError {
    /// The configuration failed validation
    #[error("invalid expiry config: {0}")]
    InvalidConfig(String),

    /// The OS refused to start the reclaimer thread
    #[error("failed to spawn reclaimer thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The reclaimer thread died, usually from a broken index invariant
    #[error("reclaimer thread panicked")]
    ReclaimerPanicked,
}

/// What the reclaimer does with live entries when the map shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownMode {
    /// Keep reclaiming until the deadline index is empty, then exit.
    ///
    /// Shutdown blocks until the longest outstanding TTL has elapsed.
    #[default]
    Drain,

    /// Reclaim entries that are already due, then exit, leaving unexpired
    /// entries in place.
    ///
    /// Use this with [`ManualClock`](crate::clock::ManualClock): a drain
    /// waits for deadlines the manual clock may never reach.
    Immediate,
}

/// Configuration for the reclaimer.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Deadline buckets reclaimed before the lock is released (default: 10)
    pub max_reclaim_buckets: usize,

    /// Pending log length at which writers wake the reclaimer (default: 4096)
    pub pending_log_high_water: usize,

    /// Shutdown behaviour (default: drain)
    pub shutdown: ShutdownMode,

    /// Name given to the reclaimer thread
    pub thread_name: String,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            max_reclaim_buckets: DEFAULT_MAX_RECLAIM_BUCKETS,
            pending_log_high_water: DEFAULT_PENDING_LOG_HIGH_WATER,
            shutdown: ShutdownMode::Drain,
            thread_name: "expiry-reclaimer".to_string(),
        }
    }
}

impl ExpiryConfig {
    /// Checks that every limit is usable.
    pub fn validate(&self) -> Result<(), ExpiryError> {
        if self.max_reclaim_buckets == 0 {
            return Err(ExpiryError::InvalidConfig(
                "max_reclaim_buckets must be > 0".to_string(),
            ));
        }
        if self.pending_log_high_water == 0 {
            return Err(ExpiryError::InvalidConfig(
                "pending_log_high_water must be > 0".to_string(),
            ));
        }
        if self.thread_name.is_empty() {
            return Err(ExpiryError::InvalidConfig(
                "thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Handle to the running reclaimer thread.
#[derive(Debug)]
pub(crate) struct Reclaimer {
    handle: Option<JoinHandle<()>>,
}

impl Reclaimer {
    /// Spawns the reclaimer for `shared`.
    pub(crate) fn spawn<K, V, C>(
        shared: Arc<Shared<K, V, C>>,
        config: ExpiryConfig,
    ) -> Result<Self, ExpiryError>
    where
        K: Eq + Hash + Clone + Send + 'static,
        V: Send + 'static,
        C: Clock,
    {
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                info!(thread = %config.thread_name, "Background reclaimer started");
                reclaim_loop::<K, V, C>(&shared, &config);
                info!(thread = %config.thread_name, "Background reclaimer stopped");
            })?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Waits for the thread to exit. Later calls return immediately.
    pub(crate) fn join(&mut self) -> Result<(), ExpiryError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ExpiryError::ReclaimerPanicked),
            None => Ok(()),
        }
    }
}

/// The main reclaimer loop.
fn reclaim_loop<K, V, C>(shared: &Shared<K, V, C>, config: &ExpiryConfig)
where
    K: Eq + Hash,
    C: Clock,
{
    loop {
        let mut state = shared.state.lock();

        let drained = state.timeouts.drain();
        if drained > 0 {
            trace!(
                drained = drained,
                buckets = state.timeouts.bucket_count(),
                "Drained pending timeouts"
            );
        }

        if state.shutdown {
            if config.shutdown == ShutdownMode::Immediate {
                let now = shared.clock.now_ms();
                while reclaim_due(shared, &mut state, now, config.max_reclaim_buckets) > 0 {}
            }
            if config.shutdown == ShutdownMode::Immediate || state.timeouts.is_empty() {
                debug!(
                    remaining = state.lookup.len(),
                    "Reclaimer received shutdown signal"
                );
                return;
            }
        }

        let Some(earliest) = state.timeouts.earliest() else {
            trace!("No deadlines indexed, reclaimer waiting for work");
            shared.wakeup.wait(&mut state);
            continue;
        };

        let now = shared.clock.now_ms();
        if earliest > now {
            let wait_ms = earliest - now;
            trace!(wait_ms = wait_ms, "Next deadline not due, reclaimer sleeping");
            shared
                .wakeup
                .wait_for(&mut state, Duration::from_millis(wait_ms));
            continue;
        }

        reclaim_due(shared, &mut state, now, config.max_reclaim_buckets);

        // Guard drops here; the next pass re-acquires so writers can interleave.
    }
}

/// Removes up to `max_buckets` due buckets from the index and their keys from
/// the lookup table. Returns the number of buckets removed.
fn reclaim_due<K, V, C>(
    shared: &Shared<K, V, C>,
    state: &mut State<K, V>,
    now_ms: u64,
    max_buckets: usize,
) -> usize
where
    K: Eq + Hash,
{
    let batch = state.timeouts.pop_expired(now_ms, max_buckets);
    if batch.buckets == 0 {
        return 0;
    }

    for key in &batch.keys {
        let removed = state.lookup.remove(key);
        assert!(
            removed.is_some(),
            "reclaimed key missing from lookup table"
        );
    }

    let reclaimed = batch.keys.len() as u64;
    shared.stats.reclaimed.fetch_add(reclaimed, Ordering::Relaxed);
    shared.stats.reclaim_passes.fetch_add(1, Ordering::Relaxed);

    debug!(
        reclaimed = reclaimed,
        buckets = batch.buckets,
        remaining = state.lookup.len(),
        "Expired entries reclaimed"
    );

    batch.buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::ExpiringMap;
    use std::time::Instant;

    fn test_config() -> ExpiryConfig {
        ExpiryConfig {
            shutdown: ShutdownMode::Immediate,
            thread_name: "test-reclaimer".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ExpiryConfig::default();
        assert_eq!(config.max_reclaim_buckets, 10);
        assert_eq!(config.pending_log_high_water, 4096);
        assert_eq!(config.shutdown, ShutdownMode::Drain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_limits() {
        let config = ExpiryConfig {
            max_reclaim_buckets: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ExpiryError::InvalidConfig(_))
        ));

        let config = ExpiryConfig {
            pending_log_high_water: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ExpiryError::InvalidConfig(_))
        ));

        let config = ExpiryConfig {
            thread_name: String::new(),
            ..Default::default()
        };
        assert!(ExpiringMap::<u64, u64>::with_config(config).is_err());
    }

    #[test]
    fn test_reclaimer_removes_expired_entries() {
        let map = ExpiringMap::with_config(test_config()).unwrap();

        for i in 0..10u64 {
            map.put(i, i, 50);
        }
        map.put(100, 100, 60_000);

        assert_eq!(map.size(), 11);

        std::thread::sleep(Duration::from_millis(250));

        assert_eq!(map.size(), 1);
        assert_eq!(map.get(&100), Some(100));
        assert!(map.stats().reclaimed >= 10);
    }

    #[test]
    fn test_reclaimer_woken_by_earlier_deadline() {
        let map = ExpiringMap::with_config(test_config()).unwrap();

        // Reclaimer goes to sleep until the far deadline
        map.put(1u64, "far", 60_000);
        std::thread::sleep(Duration::from_millis(30));

        // An earlier deadline must wake it
        map.put(2u64, "near", 30);
        std::thread::sleep(Duration::from_millis(250));

        assert_eq!(map.size(), 1);
        assert_eq!(map.get(&1), Some("far"));
    }

    #[test]
    fn test_high_water_mark_forces_drain() {
        let config = ExpiryConfig {
            pending_log_high_water: 8,
            ..test_config()
        };
        let map = ExpiringMap::with_config(config).unwrap();

        map.put(0u64, 0u64, 60_000);
        std::thread::sleep(Duration::from_millis(30));

        // Later deadlines never wake the reclaimer on their own
        for i in 1..=64u64 {
            map.put(i, i, 120_000);
        }
        std::thread::sleep(Duration::from_millis(100));

        assert!(map.pending_records() < 8);
    }

    #[test]
    fn test_immediate_shutdown_does_not_wait_for_ttl() {
        let mut map = ExpiringMap::with_config(test_config()).unwrap();
        map.put("session", 1u64, 3_600_000);

        let started = Instant::now();
        map.shutdown().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        // Shutdown is idempotent
        map.shutdown().unwrap();
    }

    #[test]
    fn test_immediate_shutdown_reclaims_due_entries() {
        let clock = ManualClock::new();
        let mut map = ExpiringMap::with_clock(test_config(), clock.clone()).unwrap();
        map.put(1u64, 1u64, 300);
        map.put(2u64, 2u64, 60_000);

        clock.advance_ms(300);
        map.shutdown().unwrap();

        assert_eq!(map.size(), 1);
        assert_eq!(map.get(&2), Some(2));
        assert_eq!(map.stats().reclaimed, 1);
    }

    #[test]
    fn test_drain_shutdown_waits_for_index_to_empty() {
        let mut map = ExpiringMap::with_config(ExpiryConfig::default()).unwrap();
        map.put("short", 1u64, 100);

        let started = Instant::now();
        map.shutdown().unwrap();

        assert!(started.elapsed() >= Duration::from_millis(90));
        assert!(map.empty());
    }
}
