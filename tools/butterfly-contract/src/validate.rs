//! Hierarchy validation
//!
//! Compares up-down distances over a hierarchy against plain Dijkstra on the input
//! graph for random node pairs.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use butterfly_common::{NodeId, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};

use crate::contractor::LiveGraph;
use crate::formats::{EbgEdges, Hierarchy};

pub const UNREACHABLE: u64 = u64::MAX;

/// One-to-all Dijkstra on the input graph (ground truth)
pub fn dijkstra(graph: &LiveGraph, source: NodeId) -> Vec<u64> {
    let mut dist = vec![UNREACHABLE; graph.n_nodes()];
    let mut heap: BinaryHeap<Reverse<(u64, u32)>> = BinaryHeap::new();

    dist[source.index()] = 0;
    heap.push(Reverse((0, source.get())));

    while let Some(Reverse((d, u))) = heap.pop() {
        if d > dist[u as usize] {
            continue;
        }
        for arc in graph.out_arcs(NodeId::new(u)) {
            let new_dist = d + arc.weight.get() as u64;
            if new_dist < dist[arc.node.index()] {
                dist[arc.node.index()] = new_dist;
                heap.push(Reverse((new_dist, arc.node.get())));
            }
        }
    }
    dist
}

/// Full search over the records flagged for one direction
fn search_hierarchy(hierarchy: &Hierarchy, source: NodeId, forward: bool) -> Vec<u64> {
    let mut dist = vec![UNREACHABLE; hierarchy.n_nodes as usize];
    let mut heap: BinaryHeap<Reverse<(u64, u32)>> = BinaryHeap::new();

    dist[source.index()] = 0;
    heap.push(Reverse((0, source.get())));

    while let Some(Reverse((d, u))) = heap.pop() {
        if d > dist[u as usize] {
            continue;
        }
        for edge in hierarchy.edges_from(NodeId::new(u)) {
            if (forward && !edge.forward) || (!forward && !edge.backward) {
                continue;
            }
            let new_dist = d + edge.weight.get() as u64;
            if new_dist < dist[edge.target.index()] {
                dist[edge.target.index()] = new_dist;
                heap.push(Reverse((new_dist, edge.target.get())));
            }
        }
    }
    dist
}

/// Shortest `source → target` distance through the hierarchy
pub fn up_down_distance(hierarchy: &Hierarchy, source: NodeId, target: NodeId) -> u64 {
    let forward = search_hierarchy(hierarchy, source, true);
    let backward = search_hierarchy(hierarchy, target, false);
    forward
        .iter()
        .zip(&backward)
        .map(|(&f, &b)| if f == UNREACHABLE || b == UNREACHABLE { UNREACHABLE } else { f + b })
        .min()
        .unwrap_or(UNREACHABLE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub source: u32,
    pub target: u32,
    pub dijkstra_dist: u64,
    pub hierarchy_dist: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub n_tests: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub unreachable_both: usize,
    /// First mismatches, at most ten
    pub errors: Vec<Mismatch>,
}

impl ValidationResult {
    pub fn passed(&self) -> bool {
        self.incorrect == 0
    }

    pub fn print(&self) {
        println!("\n=== VALIDATION RESULTS ===");
        println!("  Total tests:     {}", self.n_tests);
        println!(
            "  Correct:         {} ({:.2}%)",
            self.correct,
            100.0 * self.correct as f64 / self.n_tests.max(1) as f64
        );
        println!("  Incorrect:       {}", self.incorrect);
        println!("  Unreachable:     {}", self.unreachable_both);
        for e in &self.errors {
            println!(
                "    {} -> {}: dijkstra={} hierarchy={}",
                e.source, e.target, e.dijkstra_dist, e.hierarchy_dist
            );
        }
    }
}

/// Compare `n_pairs` random pairs; fails only on an invalid input weight
pub fn validate_hierarchy(
    input: &EbgEdges,
    hierarchy: &Hierarchy,
    n_pairs: usize,
    seed: u64,
) -> Result<ValidationResult> {
    let graph = LiveGraph::from_input(input.n_nodes, &input.edges)?;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut result = ValidationResult {
        n_tests: 0,
        correct: 0,
        incorrect: 0,
        unreachable_both: 0,
        errors: Vec::new(),
    };
    if input.n_nodes == 0 {
        return Ok(result);
    }

    info!(pairs = n_pairs, seed, "validating hierarchy");
    for i in 0..n_pairs {
        let source = NodeId::new(rng.random_range(0..input.n_nodes));
        let target = NodeId::new(rng.random_range(0..input.n_nodes));

        let dijkstra_dist = dijkstra(&graph, source)[target.index()];
        let hierarchy_dist = up_down_distance(hierarchy, source, target);
        result.n_tests += 1;

        if dijkstra_dist == hierarchy_dist {
            result.correct += 1;
            if dijkstra_dist == UNREACHABLE {
                result.unreachable_both += 1;
            }
        } else {
            result.incorrect += 1;
            warn!(%source, %target, dijkstra_dist, hierarchy_dist, "distance mismatch");
            if result.errors.len() < 10 {
                result.errors.push(Mismatch {
                    source: source.get(),
                    target: target.get(),
                    dijkstra_dist,
                    hierarchy_dist,
                });
            }
        }

        if (i + 1) % 100 == 0 {
            info!(
                done = i + 1,
                correct = result.correct,
                incorrect = result.incorrect,
                "validation progress"
            );
        }
    }
    Ok(result)
}
