//! Live graph mutated during contraction
//!
//! Per-node out- and in-adjacency vectors indexed by node id. At most one arc exists
//! per ordered pair; inserting a parallel arc keeps the cheaper one.

use butterfly_common::{Error, NodeId, Result, Weight};

use crate::formats::InputEdge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arc {
    /// Head for out-arcs, tail for in-arcs
    pub node: NodeId,
    pub weight: Weight,
    /// Middle node for shortcuts, original segment otherwise
    pub id: u32,
    pub shortcut: bool,
}

#[derive(Debug, Clone)]
pub struct LiveGraph {
    out_arcs: Vec<Vec<Arc>>,
    in_arcs: Vec<Vec<Arc>>,
    n_arcs: usize,
}

impl LiveGraph {
    /// Expand directions, validate weights and collapse parallel arcs.
    ///
    /// Self-loops never lie on a shortest path and are dropped.
    pub fn from_input(n_nodes: u32, edges: &[InputEdge]) -> Result<Self> {
        let mut arcs: Vec<(NodeId, NodeId, Weight, u32)> = Vec::with_capacity(edges.len() * 2);
        for edge in edges {
            let weight = Weight::from_raw(edge.weight).ok_or(Error::InvalidWeight {
                from: edge.source,
                to: edge.target,
                weight: edge.weight as i64,
            })?;
            if edge.source == edge.target {
                continue;
            }
            let segment = edge.segment.get();
            if edge.direction.forward() {
                arcs.push((edge.source, edge.target, weight, segment));
            }
            if edge.direction.backward() {
                arcs.push((edge.target, edge.source, weight, segment));
            }
        }

        // Minimum weight per ordered pair, lowest segment on ties
        arcs.sort_unstable();
        arcs.dedup_by_key(|&mut (s, t, _, _)| (s, t));

        let n = n_nodes as usize;
        let mut graph = LiveGraph {
            out_arcs: vec![Vec::new(); n],
            in_arcs: vec![Vec::new(); n],
            n_arcs: arcs.len(),
        };
        for (source, target, weight, segment) in arcs {
            graph.out_arcs[source.index()].push(Arc {
                node: target,
                weight,
                id: segment,
                shortcut: false,
            });
            graph.in_arcs[target.index()].push(Arc {
                node: source,
                weight,
                id: segment,
                shortcut: false,
            });
        }
        Ok(graph)
    }

    pub fn n_nodes(&self) -> usize {
        self.out_arcs.len()
    }

    /// Live arc count
    pub fn n_arcs(&self) -> usize {
        self.n_arcs
    }

    pub fn out_arcs(&self, node: NodeId) -> &[Arc] {
        &self.out_arcs[node.index()]
    }

    pub fn in_arcs(&self, node: NodeId) -> &[Arc] {
        &self.in_arcs[node.index()]
    }

    /// Distinct live neighbours in either direction, ascending
    pub fn neighbours(&self, node: NodeId) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .out_arcs(node)
            .iter()
            .chain(self.in_arcs(node))
            .map(|arc| arc.node)
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// Insert shortcut `from → to`, or lower the weight of the existing arc.
    ///
    /// Returns `false` when an arc at least as cheap is already present.
    pub fn insert_or_improve(
        &mut self,
        from: NodeId,
        to: NodeId,
        weight: Weight,
        middle: NodeId,
    ) -> bool {
        let shortcut = Arc {
            node: to,
            weight,
            id: middle.get(),
            shortcut: true,
        };

        if let Some(existing) = self.out_arcs[from.index()].iter_mut().find(|a| a.node == to) {
            if existing.weight <= weight {
                return false;
            }
            *existing = shortcut;
            if let Some(back) = self.in_arcs[to.index()].iter_mut().find(|a| a.node == from) {
                *back = Arc { node: from, ..shortcut };
            }
            return true;
        }

        self.out_arcs[from.index()].push(shortcut);
        self.in_arcs[to.index()].push(Arc { node: from, ..shortcut });
        self.n_arcs += 1;
        true
    }

    /// Detach `node` from its neighbours and drop its adjacency
    pub fn remove_node(&mut self, node: NodeId) {
        let out_arcs = std::mem::take(&mut self.out_arcs[node.index()]);
        let in_arcs = std::mem::take(&mut self.in_arcs[node.index()]);

        for arc in &out_arcs {
            self.in_arcs[arc.node.index()].retain(|a| a.node != node);
        }
        for arc in &in_arcs {
            self.out_arcs[arc.node.index()].retain(|a| a.node != node);
        }
        self.n_arcs -= out_arcs.len() + in_arcs.len();
    }
}
