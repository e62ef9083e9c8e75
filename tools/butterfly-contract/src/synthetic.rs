//! Seeded synthetic graphs for tests and the `synth` subcommand

use butterfly_common::{NodeId, SegmentId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::formats::{Direction, EbgEdges, InputEdge};

fn input_edge(
    source: u32,
    target: u32,
    weight: i32,
    direction: Direction,
    segment: usize,
) -> InputEdge {
    InputEdge {
        source: NodeId::new(source),
        target: NodeId::new(target),
        weight,
        direction,
        segment: SegmentId::new(segment as u32),
    }
}

/// One-way arcs `(source, target, weight)`, segment = position
pub fn from_arcs(n_nodes: u32, arcs: &[(u32, u32, i32)]) -> EbgEdges {
    let edges = arcs
        .iter()
        .enumerate()
        .map(|(i, &(s, t, w))| input_edge(s, t, w, Direction::Forward, i))
        .collect();
    EbgEdges::new(n_nodes, edges)
}

/// Two-way path `0 - 1 - … - k` with the given weights
pub fn path_with_weights(weights: &[i32]) -> EbgEdges {
    let edges = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| input_edge(i as u32, i as u32 + 1, w, Direction::Both, i))
        .collect();
    EbgEdges::new(weights.len() as u32 + 1, edges)
}

/// Two-way path over `n_nodes` with random weights in `1..=10`
pub fn path(n_nodes: u32, seed: u64) -> EbgEdges {
    let mut rng = StdRng::seed_from_u64(seed);
    let weights: Vec<i32> = (1..n_nodes.max(1)).map(|_| rng.random_range(1..=10)).collect();
    path_with_weights(&weights)
}

/// `width × height` grid, roughly one street in five is one-way
pub fn grid(width: u32, height: u32, seed: u64) -> EbgEdges {
    let mut rng = StdRng::seed_from_u64(seed);
    let id = |x: u32, y: u32| y * width + x;
    let mut edges = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let mut neighbours = Vec::with_capacity(2);
            if x + 1 < width {
                neighbours.push(id(x + 1, y));
            }
            if y + 1 < height {
                neighbours.push(id(x, y + 1));
            }
            for target in neighbours {
                let direction = if rng.random_bool(0.2) {
                    if rng.random_bool(0.5) {
                        Direction::Forward
                    } else {
                        Direction::Backward
                    }
                } else {
                    Direction::Both
                };
                let weight = rng.random_range(1..=100);
                let segment = edges.len();
                edges.push(input_edge(id(x, y), target, weight, direction, segment));
            }
        }
    }
    EbgEdges::new(width * height, edges)
}

/// `n_edges` random edges; may contain parallel edges, self-loops and zero weights
pub fn random(n_nodes: u32, n_edges: usize, seed: u64) -> EbgEdges {
    let mut rng = StdRng::seed_from_u64(seed);
    let edges = (0..n_edges)
        .map(|i| {
            let source = rng.random_range(0..n_nodes);
            let target = rng.random_range(0..n_nodes);
            let direction = match rng.random_range(0..3) {
                0 => Direction::Forward,
                1 => Direction::Backward,
                _ => Direction::Both,
            };
            input_edge(source, target, rng.random_range(0..=50), direction, i)
        })
        .collect();
    EbgEdges::new(n_nodes, edges)
}

/// Two disjoint two-way triangles `{0, 1, 2}` and `{3, 4, 5}`
pub fn two_triangles() -> EbgEdges {
    let edges = [(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3)]
        .iter()
        .enumerate()
        .map(|(i, &(s, t))| input_edge(s, t, 1, Direction::Both, i))
        .collect();
    EbgEdges::new(6, edges)
}
