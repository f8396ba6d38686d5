//! Doubly-linked store of queued messages, backed by a slab arena.
//!
//! The head is the oldest message and the transmit side; the tail is the
//! newest. All operations except iteration are O(1). Removal frees the slot
//! but deliberately does not touch the sort index; callers tombstone their
//! own view.

use slab::Slab;

use crate::buffer::MessageBuf;

/// Stable key of a queued message. Keys are only valid while the message is
/// live; removal invalidates the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey(usize);

#[derive(Debug)]
struct Node {
    buf: MessageBuf,
    prev: Option<NodeKey>,
    next: Option<NodeKey>,
}

#[derive(Debug, Default)]
pub(crate) struct Store {
    arena: Slab<Node>,
    head: Option<NodeKey>,
    tail: Option<NodeKey>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn head(&self) -> Option<NodeKey> {
        self.head
    }

    pub fn tail(&self) -> Option<NodeKey> {
        self.tail
    }

    pub fn get(&self, key: NodeKey) -> &MessageBuf {
        &self.arena[key.0].buf
    }

    pub fn get_mut(&mut self, key: NodeKey) -> &mut MessageBuf {
        &mut self.arena[key.0].buf
    }

    /// Neighbor toward the tail (newer).
    pub fn next(&self, key: NodeKey) -> Option<NodeKey> {
        self.arena[key.0].next
    }

    /// Neighbor toward the head (older).
    pub fn prev(&self, key: NodeKey) -> Option<NodeKey> {
        self.arena[key.0].prev
    }

    /// Append at the tail (newest side). The enqueue fast path.
    pub fn push_tail(&mut self, buf: MessageBuf) -> NodeKey {
        let key = NodeKey(self.arena.insert(Node {
            buf,
            prev: self.tail,
            next: None,
        }));
        match self.tail {
            Some(old) => self.arena[old.0].next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        key
    }

    /// Insert on the transmit side of `at`: the new message will be sent
    /// before `at` and after everything older than `at`.
    pub fn insert_before(&mut self, at: NodeKey, buf: MessageBuf) -> NodeKey {
        let prev = self.arena[at.0].prev;
        let key = NodeKey(self.arena.insert(Node {
            buf,
            prev,
            next: Some(at),
        }));
        self.arena[at.0].prev = Some(key);
        match prev {
            Some(p) => self.arena[p.0].next = Some(key),
            None => self.head = Some(key),
        }
        key
    }

    /// Unlink and return the message. The key is dead afterwards.
    pub fn remove(&mut self, key: NodeKey) -> MessageBuf {
        let node = self.arena.remove(key.0);
        match node.prev {
            Some(p) => self.arena[p.0].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => self.arena[n.0].prev = node.prev,
            None => self.tail = node.prev,
        }
        node.buf
    }

    /// Keys in transmit order, head (oldest) first.
    pub fn iter_keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            let key = cur?;
            cur = self.arena[key.0].next;
            Some(key)
        })
    }
}
