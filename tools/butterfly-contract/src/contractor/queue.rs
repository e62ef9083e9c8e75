//! Lazy-update priority queue
//!
//! Each node owns exactly one heap entry. Invalidating a node bumps its generation
//! instead of touching the heap; the entry is recognised as stale when it reaches the
//! top and is re-pushed with a fresh priority. No decrease-key is needed.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use butterfly_common::NodeId;

/// Heap key, smallest first: tier, then priority, then node id
pub type Key = (u8, i64, NodeId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    key: Reverse<Key>,
    generation: u32,
}

#[derive(Debug, Clone)]
pub struct LazyQueue {
    heap: BinaryHeap<Entry>,
    generation: Vec<u32>,
}

impl LazyQueue {
    pub fn new(n_nodes: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(n_nodes),
            generation: vec![0; n_nodes],
        }
    }

    /// Push `node` under its current generation
    pub fn push(&mut self, node: NodeId, tier: u8, priority: i64) {
        self.heap.push(Entry {
            key: Reverse((tier, priority, node)),
            generation: self.generation[node.index()],
        });
    }

    /// Mark the queued priority of `node` as outdated
    pub fn invalidate(&mut self, node: NodeId) {
        self.generation[node.index()] = self.generation[node.index()].wrapping_add(1);
    }

    fn is_stale(&self, entry: &Entry) -> bool {
        let Reverse((_, _, node)) = entry.key;
        entry.generation != self.generation[node.index()]
    }

    /// Pop every stale entry sitting on top of the heap
    pub fn pop_stale(&mut self) -> Vec<NodeId> {
        let mut stale = Vec::new();
        while let Some(top) = self.heap.peek() {
            if !self.is_stale(top) {
                break;
            }
            let Reverse((_, _, node)) = top.key;
            self.heap.pop();
            stale.push(node);
        }
        stale
    }

    /// Pop the top entry if it is up to date
    pub fn pop_fresh(&mut self) -> Option<(NodeId, Key)> {
        let top = self.heap.peek()?;
        if self.is_stale(top) {
            return None;
        }
        let Reverse(key) = top.key;
        self.heap.pop();
        Some((key.2, key))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
