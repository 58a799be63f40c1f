//! Concurrent Trie Module
//!
//! This module provides [`ConcurrentTrie`], a prefix tree supporting
//! concurrent insertion, exact lookup and bounded prefix search.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────┐
//!                 │ root Mutex │
//!                 └─────┬──────┘
//!           ┌───────────┼───────────┐
//!     ┌─────┴────┐ ┌────┴─────┐ ┌───┴──────┐
//!     │ 'a' Mutex│ │ 'b' Mutex│ │ 'f' Mutex│   one lock per node
//!     └──────────┘ └──────────┘ └────┬─────┘
//!                                    ...
//! ```
//!
//! ## Features
//!
//! - **Per-Node Locks**: inserts into unrelated subtrees run in parallel
//! - **Bounded Critical Sections**: each lock covers one node's children and
//!   value, never a whole path
//! - **Append-Only**: nodes are never removed, values may be overwritten

mod concurrent;
mod node;

pub use concurrent::{ConcurrentTrie, DEFAULT_MAX_RESULTS};
