//! Concurrent Trie with Per-Node Locking
//!
//! A prefix tree that many threads can insert into and search at once.
//! Instead of one lock for the whole tree, every node has its own, so writers
//! working in unrelated subtrees never contend.
//!
//! ## Locking Discipline
//!
//! - A node's lock guards only that node's children map and value.
//! - Walks descend one level at a time: take the node's lock, clone the child
//!   handle, release, move on. No lock is held across the descent.
//! - The final write of `insert` takes the target node's own lock while the
//!   parent's is still held, so readers (which lock the node itself) always
//!   see the value and terminus flag change together. That is the only point
//!   where two locks are held, always in parent -> child order.
//!
//! ```text
//!            root ─┐ lock, find 'f', unlock
//!                  ▼
//!               [f] ─┐ lock, find 'o', unlock
//!                    ▼
//!                 [o] ─┐ lock, find-or-create 'o'
//!                      ▼
//!                   [o] ── lock (parent still held), write value
//! ```

use crate::trie::node::{Node, Slot};
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Number of values [`ConcurrentTrie::prefix_match_default`] collects.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// A thread-safe trie mapping sequences of `S` to values of `V`.
///
/// Keys are anything that can be viewed as `&[S]`; with the default `S = u8`
/// that includes `&str`, `String`, `Vec<u8>` and `bytes::Bytes`.
///
/// There is no removal: once created, a node lives as long as the trie.
///
/// # Example
///
/// ```
/// use flashkv_core::trie::ConcurrentTrie;
///
/// let trie: ConcurrentTrie<u32> = ConcurrentTrie::new();
///
/// trie.insert("foo", 1);
/// trie.insert("faa", 2);
///
/// assert_eq!(trie.lookup("foo"), Some(1));
/// assert_eq!(trie.lookup("fo"), None);
///
/// let values = trie.prefix_match("f", 10);
/// assert_eq!(values.len(), 2);
/// ```
pub struct ConcurrentTrie<V, S = u8> {
    root: Arc<Node<S, V>>,

    /// Number of terminus nodes
    len: AtomicUsize,

    /// Number of nodes, excluding the root
    nodes: AtomicUsize,
}

impl<V, S> std::fmt::Debug for ConcurrentTrie<V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentTrie")
            .field("len", &self.len.load(Ordering::Relaxed))
            .field("nodes", &self.nodes.load(Ordering::Relaxed))
            .finish()
    }
}

impl<V, S> Default for ConcurrentTrie<V, S> {
    fn default() -> Self {
        Self {
            root: Arc::new(Node::new()),
            len: AtomicUsize::new(0),
            nodes: AtomicUsize::new(0),
        }
    }
}

impl<V, S> ConcurrentTrie<V, S> {
    /// Creates an empty trie.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys stored.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns true if no key has been inserted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of nodes, not counting the root.
    pub fn node_count(&self) -> usize {
        self.nodes.load(Ordering::Relaxed)
    }
}

impl<V, S> ConcurrentTrie<V, S>
where
    S: Eq + Hash + Clone,
{
    /// Inserts a key-value pair.
    ///
    /// If the key already exists, its value is overwritten. The empty key
    /// stores its value on the root.
    pub fn insert(&self, key: impl AsRef<[S]>, value: V) {
        let key = key.as_ref();

        let Some((last, path)) = key.split_last() else {
            let mut root = self.root.slot.lock();
            self.store(&mut root.value, value);
            return;
        };

        let mut node = Arc::clone(&self.root);
        for segment in path {
            let child = self.child_or_insert(&mut node.slot.lock(), segment);
            node = child;
        }

        let mut parent = node.slot.lock();
        let target = self.child_or_insert(&mut parent, last);
        let mut slot = target.slot.lock();
        self.store(&mut slot.value, value);
    }

    /// Searches for an exact match.
    ///
    /// Returns `None` if the key was never inserted, including when it is
    /// only a prefix of inserted keys.
    pub fn lookup(&self, key: impl AsRef<[S]>) -> Option<V>
    where
        V: Clone,
    {
        let node = self.resolve(key.as_ref())?;
        let slot = node.slot.lock();
        slot.value.clone()
    }

    /// Collects up to `max_results` distinct values whose keys start with
    /// `prefix`.
    ///
    /// Traverses breadth-first from the prefix node, so shallower keys are
    /// found first; beyond that the choice of values is unspecified.
    pub fn prefix_match(&self, prefix: impl AsRef<[S]>, max_results: usize) -> HashSet<V>
    where
        V: Eq + Hash + Clone,
    {
        let mut values = HashSet::new();
        if max_results == 0 {
            return values;
        }

        let Some(start) = self.resolve(prefix.as_ref()) else {
            return values;
        };

        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            let slot = node.slot.lock();

            if let Some(value) = &slot.value {
                values.insert(value.clone());
                if values.len() >= max_results {
                    break;
                }
            }

            queue.extend(slot.children.values().cloned());
        }

        values
    }

    /// [`prefix_match`](Self::prefix_match) with [`DEFAULT_MAX_RESULTS`].
    pub fn prefix_match_default(&self, prefix: impl AsRef<[S]>) -> HashSet<V>
    where
        V: Eq + Hash + Clone,
    {
        self.prefix_match(prefix, DEFAULT_MAX_RESULTS)
    }

    /// Walks to the node at `path`, locking one node at a time.
    fn resolve(&self, path: &[S]) -> Option<Arc<Node<S, V>>> {
        let mut node = Arc::clone(&self.root);

        for segment in path {
            let child = node.slot.lock().child(segment)?;
            node = child;
        }

        Some(node)
    }

    fn child_or_insert(
        &self,
        slot: &mut Slot<S, V>,
        segment: &S,
    ) -> Arc<Node<S, V>> {
        let (child, created) = slot.child_or_insert(segment);
        if created {
            self.nodes.fetch_add(1, Ordering::Relaxed);
        }
        child
    }

    /// Writes a value into a node slot, counting new termini.
    #[inline]
    fn store(&self, slot: &mut Option<V>, value: V) {
        if slot.replace(value).is_none() {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_lookup_missing() {
        let trie: ConcurrentTrie<u64> = ConcurrentTrie::new();

        assert_eq!(trie.lookup("foo"), None);
        assert_eq!(trie.lookup(""), None);
        assert!(trie.is_empty());
    }

    #[test]
    fn test_insert_and_lookup() {
        let trie: ConcurrentTrie<u64> = ConcurrentTrie::new();

        trie.insert("foo", 1111);
        trie.insert("faa", 2222);

        assert_eq!(trie.lookup("foo"), Some(1111));
        assert_eq!(trie.lookup("faa"), Some(2222));
        assert_eq!(trie.lookup("fee"), None);
        assert_eq!(trie.len(), 2);
        // f, o, o, a, a
        assert_eq!(trie.node_count(), 5);
    }

    #[test]
    fn test_prefix_is_not_terminus() {
        let trie: ConcurrentTrie<u64> = ConcurrentTrie::new();

        trie.insert("bloom", 1);

        assert_eq!(trie.lookup("bloo"), None);
        assert_eq!(trie.lookup("b"), None);
        assert_eq!(trie.lookup("blooms"), None);

        // Once inserted, the prefix becomes a key of its own
        trie.insert("bloo", 2);
        assert_eq!(trie.lookup("bloo"), Some(2));
        assert_eq!(trie.lookup("bloom"), Some(1));
    }

    #[test]
    fn test_overwrite() {
        let trie: ConcurrentTrie<u64> = ConcurrentTrie::new();

        trie.insert("key", 1);
        trie.insert("key", 2);

        assert_eq!(trie.lookup("key"), Some(2));
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.node_count(), 3);
    }

    #[test]
    fn test_empty_key_lives_on_root() {
        let trie: ConcurrentTrie<u64> = ConcurrentTrie::new();

        trie.insert("", 7);
        trie.insert("a", 8);

        assert_eq!(trie.lookup(""), Some(7));
        assert_eq!(trie.node_count(), 1);
        assert_eq!(trie.prefix_match("", 10), HashSet::from([7, 8]));
    }

    #[test]
    fn test_prefix_match() {
        let trie: ConcurrentTrie<u64> = ConcurrentTrie::new();

        trie.insert("foo", 1111);
        trie.insert("faa", 2222);
        trie.insert("fem", 3333);
        trie.insert("bar", 4444);

        assert_eq!(
            trie.prefix_match_default("f"),
            HashSet::from([1111, 2222, 3333])
        );

        // Overwrites replace, never duplicate
        trie.insert("foo", 4444);
        trie.insert("faa", 5555);
        trie.insert("fem", 6666);

        assert_eq!(
            trie.prefix_match_default("f"),
            HashSet::from([4444, 5555, 6666])
        );
    }

    #[test]
    fn test_prefix_match_includes_prefix_itself() {
        let trie: ConcurrentTrie<u64> = ConcurrentTrie::new();

        trie.insert("fo", 1);
        trie.insert("foo", 2);

        assert_eq!(trie.prefix_match("fo", 10), HashSet::from([1, 2]));
        assert_eq!(trie.prefix_match("foo", 10), HashSet::from([2]));
    }

    #[test]
    fn test_prefix_match_missing_prefix() {
        let trie: ConcurrentTrie<u64> = ConcurrentTrie::new();

        trie.insert("foo", 1);

        assert!(trie.prefix_match("x", 10).is_empty());
        assert!(trie.prefix_match("fooo", 10).is_empty());
    }

    #[test]
    fn test_prefix_match_respects_limit() {
        let trie: ConcurrentTrie<u64> = ConcurrentTrie::new();

        for i in 0..50u64 {
            trie.insert(format!("user:{}", i), i);
        }

        assert_eq!(trie.prefix_match_default("user:").len(), 10);
        assert_eq!(trie.prefix_match("user:", 3).len(), 3);
        assert_eq!(trie.prefix_match("user:", 100).len(), 50);
        assert!(trie.prefix_match("user:", 0).is_empty());
    }

    #[test]
    fn test_prefix_match_prefers_shallow_keys() {
        let trie: ConcurrentTrie<u64> = ConcurrentTrie::new();

        trie.insert("ab", 1);
        trie.insert("abcdef", 2);
        trie.insert("abcdefgh", 3);

        assert_eq!(trie.prefix_match("a", 1), HashSet::from([1]));
    }

    #[test]
    fn test_non_byte_segments() {
        let trie: ConcurrentTrie<&str, char> = ConcurrentTrie::new();

        let key: Vec<char> = "héllo".chars().collect();
        trie.insert(&key, "greeting");

        assert_eq!(trie.lookup(&key), Some("greeting"));
        assert_eq!(trie.node_count(), 5);
    }

    #[test]
    fn test_concurrent_inserts() {
        let trie: Arc<ConcurrentTrie<u64>> = Arc::new(ConcurrentTrie::new());
        let mut handles = vec![];

        for t in 0..8u64 {
            let trie = Arc::clone(&trie);
            handles.push(thread::spawn(move || {
                for i in 0..200u64 {
                    trie.insert(format!("key-{}-{}", t, i), t * 1000 + i);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(trie.len(), 1600);
        for t in 0..8u64 {
            assert_eq!(trie.lookup(format!("key-{}-199", t)), Some(t * 1000 + 199));
        }
    }

    #[test]
    fn test_concurrent_overwrites_and_reads() {
        let trie: Arc<ConcurrentTrie<u64>> = Arc::new(ConcurrentTrie::new());
        trie.insert("shared", 0);

        let writers: Vec<_> = (1..=4u64)
            .map(|t| {
                let trie = Arc::clone(&trie);
                thread::spawn(move || {
                    for i in 0..500 {
                        trie.insert("shared", t * 10_000 + i);
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let trie = Arc::clone(&trie);
                thread::spawn(move || {
                    for _ in 0..500 {
                        // Always a terminus: never observed half-written
                        assert!(trie.lookup("shared").is_some());
                        assert_eq!(trie.prefix_match("sh", 10).len(), 1);
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        assert_eq!(trie.len(), 1);
    }
}
