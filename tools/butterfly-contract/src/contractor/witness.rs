//! Bounded witness search
//!
//! A witness for `u → v → w` is any path `u ⇝ w` avoiding `v` that is no longer than
//! the path through `v`. Searches are cut off by hop count and settled-node count; a
//! search that gives up early only costs an extra shortcut, never a wrong distance.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use butterfly_common::NodeId;
use parking_lot::Mutex;

use super::graph::{Arc, LiveGraph};

const UNREACHED: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub hop_limit: u32,
    pub settle_limit: u32,
}

/// Shortcut needed to preserve `from → middle → to`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortcut {
    pub from: NodeId,
    pub to: NodeId,
    /// Unchecked sum, may exceed `Weight::MAX`
    pub weight: u64,
    pub middle: NodeId,
}

/// Dense per-worker search state, reset through the touched list
#[derive(Debug, Default)]
pub struct WitnessScratch {
    dist: Vec<u64>,
    hops: Vec<u32>,
    touched: Vec<u32>,
    heap: BinaryHeap<Reverse<(u64, u32)>>,
}

impl WitnessScratch {
    fn prepare(&mut self, n_nodes: usize) {
        if self.dist.len() != n_nodes {
            self.dist = vec![UNREACHED; n_nodes];
            self.hops = vec![0; n_nodes];
            self.touched.clear();
        }
        for &node in &self.touched {
            self.dist[node as usize] = UNREACHED;
        }
        self.touched.clear();
        self.heap.clear();
    }

    fn reach(&mut self, node: u32, dist: u64, hops: u32) {
        let slot = &mut self.dist[node as usize];
        if *slot == UNREACHED {
            self.touched.push(node);
        }
        *slot = dist;
        self.hops[node as usize] = hops;
        self.heap.push(Reverse((dist, node)));
    }

    /// Best known distance from the last search source
    pub fn distance(&self, node: NodeId) -> u64 {
        self.dist[node.index()]
    }

    /// Bounded Dijkstra from `source` over live nodes except `excluded`.
    ///
    /// Returns the number of settled nodes.
    pub fn search(
        &mut self,
        graph: &LiveGraph,
        source: NodeId,
        excluded: NodeId,
        max_dist: u64,
        limits: SearchLimits,
    ) -> u32 {
        self.prepare(graph.n_nodes());
        self.reach(source.get(), 0, 0);

        let mut settled = 0u32;
        while let Some(Reverse((d, x))) = self.heap.pop() {
            if d > self.dist[x as usize] {
                continue;
            }
            if d > max_dist || settled >= limits.settle_limit {
                break;
            }
            settled += 1;

            let hops = self.hops[x as usize];
            if hops >= limits.hop_limit {
                continue;
            }
            for arc in graph.out_arcs(NodeId::new(x)) {
                if arc.node == excluded {
                    continue;
                }
                let nd = d + arc.weight.get() as u64;
                if nd <= max_dist && nd < self.dist[arc.node.index()] {
                    self.reach(arc.node.get(), nd, hops + 1);
                }
            }
        }
        settled
    }

    /// Shortcuts required for the pairs entering `middle` through `incoming`
    pub fn shortcuts_from(
        &mut self,
        graph: &LiveGraph,
        incoming: &Arc,
        middle: NodeId,
        limits: SearchLimits,
    ) -> (Vec<Shortcut>, u32) {
        let from = incoming.node;
        let via = |out: &Arc| incoming.weight.get() as u64 + out.weight.get() as u64;

        let targets: Vec<&Arc> = graph
            .out_arcs(middle)
            .iter()
            .filter(|out| out.node != from)
            .collect();
        let Some(max_dist) = targets.iter().map(|out| via(*out)).max() else {
            return (Vec::new(), 0);
        };

        let settled = self.search(graph, from, middle, max_dist, limits);
        let shortcuts = targets
            .into_iter()
            .filter(|out| self.distance(out.node) > via(*out))
            .map(|out| Shortcut {
                from,
                to: out.node,
                weight: via(out),
                middle,
            })
            .collect();
        (shortcuts, settled)
    }
}

/// One scratch slot per pool thread
pub struct ScratchPool {
    slots: Vec<Mutex<WitnessScratch>>,
}

impl ScratchPool {
    pub fn new(threads: usize) -> Self {
        Self {
            slots: (0..threads.max(1)).map(|_| Mutex::new(WitnessScratch::default())).collect(),
        }
    }

    /// Run `f` with the scratch slot of the current rayon worker
    pub fn with<R>(&self, f: impl FnOnce(&mut WitnessScratch) -> R) -> R {
        let index = rayon::current_thread_index().unwrap_or(0) % self.slots.len();
        let mut scratch = self.slots[index].lock();
        f(&mut scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    const LIMITS: SearchLimits = SearchLimits {
        hop_limit: 5,
        settle_limit: 500,
    };

    fn n(id: u32) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn test_witness_suppresses_shortcut() {
        // 0 -> 1 -> 2 costs 2, 0 -> 3 -> 2 costs 2 as well
        let input = synthetic::from_arcs(4, &[(0, 1, 1), (1, 2, 1), (0, 3, 1), (3, 2, 1)]);
        let graph = LiveGraph::from_input(input.n_nodes, &input.edges).unwrap();
        let mut scratch = WitnessScratch::default();

        let incoming = graph.in_arcs(n(1))[0];
        let (shortcuts, settled) = scratch.shortcuts_from(&graph, &incoming, n(1), LIMITS);
        assert!(shortcuts.is_empty());
        assert!(settled >= 2);
    }

    #[test]
    fn test_longer_detour_needs_shortcut() {
        let input = synthetic::from_arcs(4, &[(0, 1, 1), (1, 2, 1), (0, 3, 1), (3, 2, 5)]);
        let graph = LiveGraph::from_input(input.n_nodes, &input.edges).unwrap();
        let mut scratch = WitnessScratch::default();

        let incoming = graph.in_arcs(n(1))[0];
        let (shortcuts, _) = scratch.shortcuts_from(&graph, &incoming, n(1), LIMITS);
        assert_eq!(
            shortcuts,
            vec![Shortcut {
                from: n(0),
                to: n(2),
                weight: 2,
                middle: n(1),
            }]
        );
    }

    #[test]
    fn test_hop_limit_cuts_witness() {
        // Witness 0 -> 3 -> 4 -> 2 has three hops
        let input = synthetic::from_arcs(
            5,
            &[(0, 1, 5), (1, 2, 5), (0, 3, 1), (3, 4, 1), (4, 2, 1)],
        );
        let graph = LiveGraph::from_input(input.n_nodes, &input.edges).unwrap();
        let mut scratch = WitnessScratch::default();
        let incoming = graph.in_arcs(n(1))[0];

        let tight = SearchLimits {
            hop_limit: 2,
            settle_limit: 500,
        };
        assert_eq!(scratch.shortcuts_from(&graph, &incoming, n(1), tight).0.len(), 1);
        assert!(scratch.shortcuts_from(&graph, &incoming, n(1), LIMITS).0.is_empty());
    }

    #[test]
    fn test_scratch_is_reset_between_searches() {
        let input = synthetic::from_arcs(3, &[(0, 1, 1), (1, 2, 1)]);
        let graph = LiveGraph::from_input(input.n_nodes, &input.edges).unwrap();
        let mut scratch = WitnessScratch::default();

        scratch.search(&graph, n(0), n(2), 10, LIMITS);
        assert_eq!(scratch.distance(n(1)), 1);
        scratch.search(&graph, n(2), n(0), 10, LIMITS);
        assert_eq!(scratch.distance(n(1)), UNREACHED);
        assert_eq!(scratch.distance(n(2)), 0);
    }

    #[test]
    fn test_pool_outside_rayon_uses_first_slot() {
        let pool = ScratchPool::new(4);
        let len = pool.with(|scratch| {
            scratch.prepare(8);
            scratch.dist.len()
        });
        assert_eq!(len, 8);
    }
}
