//! # FlashKV Core - Concurrent In-Memory Building Blocks
//!
//! Two thread-safe containers used underneath FlashKV services:
//!
//! - [`ExpiringMap`]: a key-value map where every entry has a time-to-live
//!   and a background reclaimer evicts it once expired
//! - [`ConcurrentTrie`]: a prefix tree with one lock per node, supporting
//!   concurrent insertion, exact lookup and bounded prefix search
//!
//! Both keep foreground critical sections small. The map pushes the cost of
//! ordering keys by deadline onto its reclaimer thread; the trie never holds
//! a lock across more than one level of the tree.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            flashkv-core                                 │
//! │                                                                         │
//! │  ┌───────────────────────────────────┐   ┌───────────────────────────┐  │
//! │  │ ExpiringMap                       │   │ ConcurrentTrie            │  │
//! │  │  Mutex<lookup + pending log>      │   │  root                     │  │
//! │  │        │ Condvar                  │   │   ├─ [a] Mutex            │  │
//! │  │        ▼                          │   │   └─ [f] Mutex            │  │
//! │  │  Reclaimer thread                 │   │        ├─ [o] Mutex       │  │
//! │  │   (deadline-ordered index)        │   │        └─ [e] Mutex       │  │
//! │  └───────────────┬───────────────────┘   └───────────────────────────┘  │
//! │                  │                                                      │
//! │            ┌─────┴─────┐                                                │
//! │            │   Clock   │  (monotonic milliseconds)                      │
//! │            └───────────┘                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use flashkv_core::{ConcurrentTrie, ExpiringMap};
//!
//! // Entries vanish after their TTL (in milliseconds)
//! let sessions = ExpiringMap::new();
//! sessions.put("user:42", "token", 30_000);
//! assert_eq!(sessions.get("user:42"), Some("token"));
//! sessions.remove("user:42");
//!
//! // Prefix search over string keys
//! let index: ConcurrentTrie<u32> = ConcurrentTrie::new();
//! index.insert("user:42", 42);
//! index.insert("user:7", 7);
//! assert_eq!(index.prefix_match("user:", 10).len(), 2);
//! ```
//!
//! ## Module Overview
//!
//! - [`clock`]: millisecond clock abstraction used for deadlines
//! - [`storage`]: the expiring map, its reclaimer and deadline index
//! - [`trie`]: the per-node-locked trie
//!
//! ## Error Model
//!
//! Absent keys are reported as `None`, never as errors. The only `Result`s
//! come from starting and stopping the reclaimer thread ([`ExpiryError`]).
//! A corrupted deadline index is a bug, not a runtime condition: the
//! reclaimer panics on it and [`ExpiringMap::shutdown`] reports the panic.

pub mod clock;
pub mod storage;
pub mod trie;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use storage::{ExpiringMap, ExpiryConfig, ExpiryError, MapStats, ShutdownMode};
pub use trie::{ConcurrentTrie, DEFAULT_MAX_RESULTS};

/// Version of flashkv-core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
