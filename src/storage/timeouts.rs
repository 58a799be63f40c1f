//! Deferred Deadline Index
//!
//! Keeping keys sorted by deadline costs O(log n) per change. Foreground
//! writers should not pay that while holding the map lock, so the index is
//! split in two phases:
//!
//! ```text
//!   put / remove                         reclaimer
//!        │                                   │
//!        ▼                                   ▼
//! ┌──────────────┐   drain()   ┌──────────────────────────────┐
//! │  PendingLog  │ ──────────> │ DeadlineIndex                │
//! │  Vec, O(1)   │             │ BTreeMap<deadline, {keys}>   │
//! └──────────────┘             └──────────────────────────────┘
//! ```
//!
//! Writers only append [`TimeoutRecord`]s. The reclaimer replays them in
//! order into the sorted buckets the next time it runs, so many foreground
//! changes are folded into one ordered pass.
//!
//! A bucket holds every key that shares the exact same millisecond deadline.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// What a pending record asks the index to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Add the key to the bucket at the deadline.
    Insertion,
    /// Remove the key from the bucket at the deadline.
    Cancellation,
}

/// One entry of the append-only pending log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutRecord<K> {
    pub key: K,
    pub deadline_ms: u64,
    pub kind: RecordKind,
}

/// Pending log plus the deadline-ordered buckets it feeds.
///
/// Not synchronized on its own; the expiring map keeps it behind its global
/// lock together with the lookup table.
pub struct DeadlineIndex<K> {
    pending: Vec<TimeoutRecord<K>>,
    buckets: BTreeMap<u64, HashSet<K>>,
}

impl<K> Default for DeadlineIndex<K> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            buckets: BTreeMap::new(),
        }
    }
}

impl<K> fmt::Debug for DeadlineIndex<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadlineIndex")
            .field("pending", &self.pending.len())
            .field("buckets", &self.buckets.len())
            .field("earliest", &self.earliest())
            .finish()
    }
}

impl<K> DeadlineIndex<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `key` now expires at `deadline_ms`.
    #[inline]
    pub fn log_insertion(&mut self, key: K, deadline_ms: u64) {
        self.pending.push(TimeoutRecord {
            key,
            deadline_ms,
            kind: RecordKind::Insertion,
        });
    }

    /// Records that the membership of `key` at `deadline_ms` is stale.
    #[inline]
    pub fn log_cancellation(&mut self, key: K, deadline_ms: u64) {
        self.pending.push(TimeoutRecord {
            key,
            deadline_ms,
            kind: RecordKind::Cancellation,
        });
    }

    /// Number of records waiting to be drained.
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of distinct deadlines currently indexed.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// True when no drained deadline is known.
    ///
    /// Records still sitting in the pending log are not counted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Earliest drained deadline, if any.
    #[inline]
    pub fn earliest(&self) -> Option<u64> {
        self.buckets.keys().next().copied()
    }
}

impl<K: Eq + Hash> DeadlineIndex<K> {
    /// Replays the pending log into the buckets, in append order.
    ///
    /// Returns the number of records applied.
    ///
    /// # Panics
    ///
    /// Panics if a cancellation names a key that is not in the bucket at its
    /// deadline, or an insertion adds a key that is already there. Either
    /// means the log no longer mirrors the lookup table.
    pub fn drain(&mut self) -> usize {
        let applied = self.pending.len();

        for record in std::mem::take(&mut self.pending) {
            match record.kind {
                RecordKind::Insertion => {
                    let inserted = self
                        .buckets
                        .entry(record.deadline_ms)
                        .or_default()
                        .insert(record.key);
                    assert!(
                        inserted,
                        "duplicate insertion into deadline bucket {}",
                        record.deadline_ms
                    );
                }
                RecordKind::Cancellation => {
                    let Some(bucket) = self.buckets.get_mut(&record.deadline_ms) else {
                        panic!(
                            "cancellation references missing deadline bucket {}",
                            record.deadline_ms
                        );
                    };
                    assert!(
                        bucket.remove(&record.key),
                        "cancellation not found in deadline bucket {}",
                        record.deadline_ms
                    );
                    if bucket.is_empty() {
                        self.buckets.remove(&record.deadline_ms);
                    }
                }
            }
        }

        applied
    }

    /// Removes up to `max_buckets` buckets whose deadline is `<= now_ms`,
    /// earliest first, and returns their keys.
    ///
    /// Stops at the first bucket still in the future.
    pub fn pop_expired(&mut self, now_ms: u64, max_buckets: usize) -> ExpiredBatch<K> {
        let mut batch = ExpiredBatch {
            keys: Vec::new(),
            buckets: 0,
        };

        while batch.buckets < max_buckets {
            let Some(entry) = self.buckets.first_entry() else {
                break;
            };
            if *entry.key() > now_ms {
                break;
            }
            batch.keys.extend(entry.remove());
            batch.buckets += 1;
        }

        batch
    }
}

/// Keys collected by one bounded reclaim pass.
#[derive(Debug)]
pub struct ExpiredBatch<K> {
    pub keys: Vec<K>,
    pub buckets: usize,
}
