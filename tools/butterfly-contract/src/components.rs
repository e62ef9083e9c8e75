//! Weakly connected components of the input graph
//!
//! Every directed edge counts as undirected for reachability. Component ids are
//! deterministic: the largest component is `c0`, ties broken by the smallest member id.

use std::collections::VecDeque;

use butterfly_common::{ComponentId, NodeId};
use serde::Serialize;
use tracing::info;

use crate::formats::InputEdge;

/// Per-node component labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components {
    labels: Vec<ComponentId>,
    sizes: Vec<u32>,
}

impl Components {
    pub fn component_of(&self, node: NodeId) -> ComponentId {
        self.labels[node.index()]
    }

    pub fn size_of(&self, node: NodeId) -> u32 {
        self.sizes[self.component_of(node).index()]
    }

    /// Node lies in a component smaller than `min_size`
    pub fn is_tiny(&self, node: NodeId, min_size: u32) -> bool {
        self.size_of(node) < min_size
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Component sizes indexed by component id, descending
    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    pub fn summary(&self, min_size: u32) -> ComponentSummary {
        let tiny: Vec<u32> = self
            .sizes
            .iter()
            .copied()
            .filter(|&size| size < min_size)
            .collect();
        ComponentSummary {
            components: self.sizes.len(),
            largest: self.sizes.iter().take(5).copied().collect(),
            tiny_components: tiny.len(),
            tiny_nodes: tiny.iter().map(|&s| s as u64).sum(),
        }
    }
}

/// Component statistics for logs and reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentSummary {
    pub components: usize,
    /// Up to five largest sizes
    pub largest: Vec<u32>,
    pub tiny_components: usize,
    pub tiny_nodes: u64,
}

impl ComponentSummary {
    pub fn log(&self, min_size: u32) {
        info!(
            components = self.components,
            largest = ?self.largest,
            "connected components"
        );
        if self.tiny_components > 0 {
            info!(
                tiny_components = self.tiny_components,
                tiny_nodes = self.tiny_nodes,
                min_component_size = min_size,
                "tiny components will be contracted first"
            );
        }
    }
}

/// Label weakly connected components with a BFS over the symmetrised graph
pub fn find_components(n_nodes: u32, edges: &[InputEdge]) -> Components {
    let n = n_nodes as usize;

    // Symmetric adjacency in CSR form
    let mut degree = vec![0u32; n + 1];
    for edge in edges {
        degree[edge.source.index() + 1] += 1;
        degree[edge.target.index() + 1] += 1;
    }
    let mut offsets = degree;
    for i in 0..n {
        offsets[i + 1] += offsets[i];
    }
    let mut cursor = offsets.clone();
    let mut heads = vec![0u32; offsets[n] as usize];
    for edge in edges {
        let (s, t) = (edge.source.index(), edge.target.index());
        heads[cursor[s] as usize] = t as u32;
        cursor[s] += 1;
        heads[cursor[t] as usize] = s as u32;
        cursor[t] += 1;
    }

    let mut visited = vec![false; n];
    // Scanning starts in id order, so `start` is the smallest member
    let mut found: Vec<(usize, Vec<u32>)> = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }

        let mut members = Vec::new();
        queue.push_back(start);
        visited[start] = true;

        while let Some(u) = queue.pop_front() {
            members.push(u as u32);
            for &v in &heads[offsets[u] as usize..offsets[u + 1] as usize] {
                let v = v as usize;
                if !visited[v] {
                    visited[v] = true;
                    queue.push_back(v);
                }
            }
        }

        found.push((start, members));
    }

    // Sort by size descending, then by min node ID for determinism
    found.sort_by(|(a_min, a), (b_min, b)| b.len().cmp(&a.len()).then_with(|| a_min.cmp(b_min)));

    let mut labels = vec![ComponentId::default(); n];
    let mut sizes = Vec::with_capacity(found.len());
    for (id, (_, members)) in found.iter().enumerate() {
        for &node in members {
            labels[node as usize] = ComponentId::new(id as u32);
        }
        sizes.push(members.len() as u32);
    }

    Components { labels, sizes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    #[test]
    fn test_two_triangles() {
        let graph = synthetic::two_triangles();
        let components = find_components(graph.n_nodes, &graph.edges);

        assert_eq!(components.len(), 2);
        assert_eq!(components.sizes(), &[3, 3]);
        let first = components.component_of(NodeId::new(0));
        let second = components.component_of(NodeId::new(3));
        assert_ne!(first, second);
        for node in 0..6 {
            assert_eq!(components.size_of(NodeId::new(node)), 3);
        }
        // Smallest member id breaks the size tie
        assert_eq!(first, ComponentId::new(0));
    }

    #[test]
    fn test_direction_is_ignored() {
        // 0 -> 1 <- 2 is one weak component
        let graph = synthetic::from_arcs(3, &[(0, 1, 1), (2, 1, 1)]);
        let components = find_components(graph.n_nodes, &graph.edges);
        assert_eq!(components.len(), 1);
        assert_eq!(components.sizes(), &[3]);
    }

    #[test]
    fn test_isolated_nodes_and_tiny_flag() {
        let graph = synthetic::from_arcs(5, &[(0, 1, 1), (1, 2, 1)]);
        let components = find_components(graph.n_nodes, &graph.edges);

        assert_eq!(components.sizes(), &[3, 1, 1]);
        assert_eq!(components.sizes().iter().sum::<u32>(), 5);
        assert!(components.is_tiny(NodeId::new(4), 2));
        assert!(!components.is_tiny(NodeId::new(1), 2));
        assert_eq!(components.component_of(NodeId::new(3)), ComponentId::new(1));

        let summary = components.summary(2);
        assert_eq!(summary.tiny_components, 2);
        assert_eq!(summary.tiny_nodes, 2);
        assert_eq!(summary.largest, vec![3, 1, 1]);
    }
}
