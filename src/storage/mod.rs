//! Expiring Storage Module
//!
//! This module provides [`ExpiringMap`], a thread-safe key-value map whose
//! entries carry a time-to-live, together with the background reclaimer that
//! evicts them and the deferred deadline index the reclaimer maintains.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ExpiringMap                           │
//! │   put / get / remove ──> Mutex<lookup + pending log>        │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲   │ Condvar
//!                            │   ▼
//!              ┌─────────────┴─────────────┐
//!              │        Reclaimer          │
//!              │  (dedicated OS thread)    │
//!              │  drains log -> deadlines  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Lazy Expiry**: reads never return an entry past its deadline
//! - **Active Expiry**: the reclaimer sleeps until the next deadline and
//!   removes expired entries in bounded batches
//! - **Cheap Writes**: writers append to a log; ordering by deadline happens
//!   off the hot path
//!
//! ## Example
//!
//! ```
//! use flashkv_core::storage::{ExpiringMap, ExpiryConfig};
//! use std::time::Duration;
//!
//! let map = ExpiringMap::with_config(ExpiryConfig::default()).unwrap();
//!
//! map.put("greeting", "hello", 50);
//! assert_eq!(map.get("greeting"), Some("hello"));
//!
//! std::thread::sleep(Duration::from_millis(60));
//! assert_eq!(map.get("greeting"), None);
//! ```

pub mod engine;
pub mod expiry;
pub mod timeouts;

// Re-export commonly used types
pub use engine::{ExpiringMap, MapStats};
pub use expiry::{ExpiryConfig, ExpiryError, ShutdownMode};
pub use timeouts::{DeadlineIndex, RecordKind, TimeoutRecord};
