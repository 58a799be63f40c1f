//! Trie nodes.
//!
//! Each node carries its own lock. Children are reference counted so a walker
//! can keep a child alive after releasing the parent's lock; nodes are never
//! removed, so a child handle stays valid for the life of the trie.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// A node in the trie. The root is a sentinel reached by the empty key.
pub(crate) struct Node<S, V> {
    pub(crate) slot: Mutex<Slot<S, V>>,
}

/// Everything guarded by a node's lock.
pub(crate) struct Slot<S, V> {
    /// Next level, keyed by segment
    pub(crate) children: HashMap<S, Arc<Node<S, V>>>,

    /// `Some` iff a key ends exactly here (the node is a terminus)
    pub(crate) value: Option<V>,
}

impl<S, V> Node<S, V> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                children: HashMap::new(),
                value: None,
            }),
        }
    }
}

impl<S: Eq + Hash + Clone, V> Slot<S, V> {
    /// Returns the child for `segment`, creating it if needed.
    ///
    /// The flag is `true` when the child was created by this call.
    pub(crate) fn child_or_insert(&mut self, segment: &S) -> (Arc<Node<S, V>>, bool) {
        if let Some(child) = self.children.get(segment) {
            return (Arc::clone(child), false);
        }

        let child = Arc::new(Node::new());
        self.children.insert(segment.clone(), Arc::clone(&child));
        (child, true)
    }

    /// Returns the existing child for `segment`.
    #[inline]
    pub(crate) fn child(&self, segment: &S) -> Option<Arc<Node<S, V>>> {
        self.children.get(segment).cloned()
    }
}
