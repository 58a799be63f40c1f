//! Thread-Safe Expiring Map
//!
//! This module implements [`ExpiringMap`], a key-value map where every entry
//! carries a deadline and is removed by a background reclaimer once it
//! passes.
//!
//! ## Design Decisions
//!
//! 1. **One Lock, Short Critical Sections**: `put`, `get` and `remove` touch a
//!    hash map and append to a `Vec`, both O(1) amortized.
//! 2. **Deferred Ordering**: keeping keys sorted by deadline is the
//!    reclaimer's job. Writers append timeout records; the reclaimer folds
//!    them into the ordered index in batches (see [`timeouts`]).
//! 3. **Lazy Expiry**: `get` checks the entry's own deadline, so an expired
//!    value is never returned even if the reclaimer is behind.
//!
//! ## Concurrency Model
//!
//! ```text
//!  put / get / remove (any thread)          reclaimer thread
//!            │                                    │
//!            ▼                                    ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │ Mutex<State>                                              │
//! │   lookup:   HashMap<K, Entry<V>>   (source of truth)      │
//! │   timeouts: DeadlineIndex<K>       (pending log + buckets)│
//! │   shutdown: bool                                          │
//! └───────────────────────────────────────────────────────────┘
//!            │ notify                             ▲ wait / wait_for
//!            └──────────────── Condvar ───────────┘
//! ```
//!
//! [`timeouts`]: crate::storage::timeouts

use crate::clock::{Clock, MonotonicClock};
use crate::storage::expiry::{ExpiryConfig, ExpiryError, Reclaimer};
use crate::storage::timeouts::DeadlineIndex;
use parking_lot::{Condvar, Mutex};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// A stored value and the millisecond deadline after which it is gone.
#[derive(Debug)]
pub(crate) struct Entry<V> {
    pub(crate) value: V,
    pub(crate) deadline_ms: u64,
}

impl<V> Entry<V> {
    fn new(value: V, deadline_ms: u64) -> Self {
        Self { value, deadline_ms }
    }

    #[inline]
    fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline_ms
    }
}

/// Everything guarded by the global lock.
pub(crate) struct State<K, V> {
    pub(crate) lookup: HashMap<K, Entry<V>>,
    pub(crate) timeouts: DeadlineIndex<K>,
    pub(crate) shutdown: bool,
}

/// Operation counters, updated with relaxed ordering.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) puts: AtomicU64,
    pub(crate) gets: AtomicU64,
    pub(crate) hits: AtomicU64,
    pub(crate) removes: AtomicU64,
    pub(crate) reclaimed: AtomicU64,
    pub(crate) reclaim_passes: AtomicU64,
}

/// State shared between the map handle and its reclaimer thread.
pub(crate) struct Shared<K, V, C> {
    pub(crate) state: Mutex<State<K, V>>,
    pub(crate) wakeup: Condvar,
    pub(crate) clock: C,
    pub(crate) stats: Counters,
}

/// Snapshot of map statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapStats {
    /// Entries physically present, expired or not
    pub entries: u64,
    pub puts: u64,
    pub gets: u64,
    /// Gets that returned a value
    pub hits: u64,
    pub removes: u64,
    /// Entries removed by the reclaimer
    pub reclaimed: u64,
    /// Reclaim passes that removed at least one bucket
    pub reclaim_passes: u64,
}

/// A thread-safe map whose entries expire after a per-entry TTL.
///
/// Creating a map starts its reclaimer thread; dropping it (or calling
/// [`shutdown`](Self::shutdown)) stops and joins that thread. With the
/// default [`ShutdownMode::Drain`](crate::storage::ShutdownMode::Drain) that
/// waits for every indexed entry to expire.
///
/// # Example
///
/// ```
/// use flashkv_core::storage::ExpiringMap;
///
/// let map = ExpiringMap::new();
///
/// map.put("session", "token123", 60_000);
/// assert_eq!(map.get("session"), Some("token123"));
///
/// map.remove("session");
/// assert_eq!(map.get("session"), None);
/// ```
pub struct ExpiringMap<K, V, C = MonotonicClock> {
    shared: Arc<Shared<K, V, C>>,
    reclaimer: Reclaimer,
    pending_log_high_water: usize,
}

impl<K, V, C> Debug for ExpiringMap<K, V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ExpiringMap")
            .field("entries", &state.lookup.len())
            .field("timeouts", &state.timeouts)
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

impl<K, V> ExpiringMap<K, V, MonotonicClock>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
{
    /// Creates a map with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the reclaimer thread cannot be spawned, like
    /// [`std::thread::spawn`]. Use [`with_config`](Self::with_config) to
    /// handle that case.
    pub fn new() -> Self {
        match Self::with_config(ExpiryConfig::default()) {
            Ok(map) => map,
            Err(e) => panic!("failed to start expiring map: {}", e),
        }
    }

    /// Creates a map with a custom reclaimer configuration.
    pub fn with_config(config: ExpiryConfig) -> Result<Self, ExpiryError> {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<K, V> Default for ExpiringMap<K, V, MonotonicClock>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> ExpiringMap<K, V, C>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
    C: Clock,
{
    /// Creates a map that reads time from `clock`.
    pub fn with_clock(config: ExpiryConfig, clock: C) -> Result<Self, ExpiryError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                lookup: HashMap::new(),
                timeouts: DeadlineIndex::new(),
                shutdown: false,
            }),
            wakeup: Condvar::new(),
            clock,
            stats: Counters::default(),
        });

        let pending_log_high_water = config.pending_log_high_water;
        let reclaimer = Reclaimer::spawn(Arc::clone(&shared), config)?;

        Ok(Self {
            shared,
            reclaimer,
            pending_log_high_water,
        })
    }

    /// Inserts or overwrites `key`, expiring `ttl_ms` milliseconds from now.
    ///
    /// Overwriting replaces both the value and the deadline; a shorter TTL
    /// takes effect immediately.
    pub fn put(&self, key: K, value: V, ttl_ms: u64) {
        self.shared.stats.puts.fetch_add(1, Ordering::Relaxed);

        let mut state = self.shared.state.lock();
        let deadline_ms = self.shared.clock.now_ms().saturating_add(ttl_ms);

        let previous = state
            .lookup
            .insert(key.clone(), Entry::new(value, deadline_ms));
        if state.shutdown {
            // No reclaimer left to drain the log
            return;
        }
        if let Some(previous) = previous {
            state
                .timeouts
                .log_cancellation(key.clone(), previous.deadline_ms);
        }
        state.timeouts.log_insertion(key, deadline_ms);

        let sooner = state
            .timeouts
            .earliest()
            .map_or(true, |earliest| deadline_ms < earliest);
        if sooner || state.timeouts.pending_len() >= self.pending_log_high_water {
            self.shared.wakeup.notify_one();
        }
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or its deadline has passed,
    /// whether or not the reclaimer has removed it yet. After
    /// [`shutdown`](Self::shutdown) an expired entry found here is removed.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.shared.stats.gets.fetch_add(1, Ordering::Relaxed);

        let mut state = self.shared.state.lock();
        let entry = state.lookup.get(key)?;
        if !entry.is_expired_at(self.shared.clock.now_ms()) {
            self.shared.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value.clone());
        }

        if state.shutdown {
            state.lookup.remove(key);
        }
        None
    }

    /// Checks if a key exists and has not expired.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let state = self.shared.state.lock();
        let now = self.shared.clock.now_ms();

        state
            .lookup
            .get(key)
            .map(|entry| !entry.is_expired_at(now))
            .unwrap_or(false)
    }

    /// Returns the time left before `key` expires, or `None` if it is absent
    /// or already expired.
    pub fn remaining_ttl<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let state = self.shared.state.lock();
        let now = self.shared.clock.now_ms();

        let entry = state.lookup.get(key)?;
        if entry.is_expired_at(now) {
            return None;
        }
        Some(Duration::from_millis(entry.deadline_ms - now))
    }

    /// Removes a key from the map.
    ///
    /// # Returns
    ///
    /// Returns `true` if an unexpired entry was removed, `false` if the key
    /// was absent or already expired.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared.stats.removes.fetch_add(1, Ordering::Relaxed);

        let mut state = self.shared.state.lock();
        let Some((key, entry)) = state.lookup.remove_entry(key) else {
            return false;
        };
        if !state.shutdown {
            state.timeouts.log_cancellation(key, entry.deadline_ms);
        }

        !entry.is_expired_at(self.shared.clock.now_ms())
    }

    /// Returns the number of entries physically present.
    ///
    /// Entries past their deadline are counted until the reclaimer removes
    /// them; pair with [`get`](Self::get) for a logical view.
    pub fn size(&self) -> usize {
        self.shared.state.lock().lookup.len()
    }

    /// Returns true if no entries are physically present.
    pub fn empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of timeout records not yet folded into the deadline index.
    pub fn pending_records(&self) -> usize {
        self.shared.state.lock().timeouts.pending_len()
    }

    /// Returns map statistics.
    pub fn stats(&self) -> MapStats {
        let entries = self.size() as u64;
        let stats = &self.shared.stats;

        MapStats {
            entries,
            puts: stats.puts.load(Ordering::Relaxed),
            gets: stats.gets.load(Ordering::Relaxed),
            hits: stats.hits.load(Ordering::Relaxed),
            removes: stats.removes.load(Ordering::Relaxed),
            reclaimed: stats.reclaimed.load(Ordering::Relaxed),
            reclaim_passes: stats.reclaim_passes.load(Ordering::Relaxed),
        }
    }
}

impl<K, V, C> ExpiringMap<K, V, C> {
    /// Stops the reclaimer and waits for its thread to exit.
    ///
    /// With [`ShutdownMode::Drain`](crate::storage::ShutdownMode::Drain) this
    /// blocks until every indexed entry has expired. Calling it again is a
    /// no-op. Foreground operations keep working afterwards without
    /// recording timeouts; nothing is reclaimed in the background anymore.
    ///
    /// # Errors
    ///
    /// Returns [`ExpiryError::ReclaimerPanicked`] if the reclaimer died,
    /// which means the deadline index was corrupted.
    pub fn shutdown(&mut self) -> Result<(), ExpiryError> {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.wakeup.notify_all();
        }
        self.reclaimer.join()
    }
}

#[cfg(test)]
impl<K, V, C> ExpiringMap<K, V, C> {
    /// Appends a cancellation for a membership the index never had.
    pub(crate) fn log_stray_cancellation(&self, key: K, deadline_ms: u64) {
        let mut state = self.shared.state.lock();
        state.timeouts.log_cancellation(key, deadline_ms);
        self.shared.wakeup.notify_one();
    }
}

impl<K, V, C> Drop for ExpiringMap<K, V, C> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "Expiring map reclaimer did not shut down cleanly");
        }
    }
}
