//! Node contraction
//!
//! Nodes are removed one at a time in lazy-priority order. Removing `v` inserts a
//! shortcut `u → w` for every pair `u → v → w` that has no witness, then turns v's
//! remaining arcs into final records stored at `v`. Contraction stops after
//! `ceil(core_factor · N)` nodes; whatever is left forms the core.
//!
//! Witness searches and priority evaluation run on a rayon pool and only read the
//! live graph. Every mutation happens on the coordinating thread between parallel
//! phases, so results do not depend on the thread count.

mod graph;
mod queue;
mod witness;

use std::time::Instant;

use butterfly_common::{Error, NodeId, Result, Weight};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::components::Components;
use crate::config::ContractorConfig;
use crate::formats::{Hierarchy, InputEdge, QueryEdge};

pub use graph::LiveGraph;
use queue::LazyQueue;
use witness::{ScratchPool, SearchLimits};

/// Counters collected while contracting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContractionStats {
    /// Directed arcs after direction expansion and parallel-arc collapse
    pub input_arcs: u64,
    pub contracted_nodes: u64,
    pub core_nodes: u64,
    pub shortcuts_inserted: u64,
    pub witness_searches: u64,
    pub settled_nodes: u64,
    pub priority_updates: u64,
    pub emitted_edges: u64,
    pub threads: usize,
}

/// Output of a contraction run
#[derive(Debug)]
pub struct ContractedGraph {
    pub n_nodes: u32,
    pub edges: Vec<QueryEdge>,
    pub is_core: Vec<bool>,
    /// Contraction position, `None` for core nodes
    pub rank: Vec<Option<u32>>,
    pub stats: ContractionStats,
    /// Non-fatal findings, currently only [`Error::DisconnectedCore`]
    pub diagnostics: Vec<Error>,
}

impl ContractedGraph {
    pub fn into_hierarchy(self, input_edges_crc: u64, inputs_sha: [u8; 32]) -> Hierarchy {
        Hierarchy::new(self.n_nodes, self.edges, self.is_core, input_edges_crc, inputs_sha)
    }
}

pub struct Contractor<'a> {
    graph: LiveGraph,
    components: &'a Components,
    config: ContractorConfig,
    contracted_neighbours: Vec<u32>,
    rank: Vec<Option<u32>>,
    records: Vec<QueryEdge>,
    stats: ContractionStats,
}

impl<'a> Contractor<'a> {
    /// Build the live graph. Fails on a negative weight or a bad configuration.
    pub fn new(
        n_nodes: u32,
        edges: &[InputEdge],
        components: &'a Components,
        config: &ContractorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let graph = LiveGraph::from_input(n_nodes, edges)?;
        let stats = ContractionStats {
            input_arcs: graph.n_arcs() as u64,
            ..Default::default()
        };

        Ok(Self {
            graph,
            components,
            config: config.clone(),
            contracted_neighbours: vec![0; n_nodes as usize],
            rank: vec![None; n_nodes as usize],
            records: Vec::new(),
            stats,
        })
    }

    /// Contract in priority order until the configured core remains
    pub fn run(self) -> Result<ContractedGraph> {
        let pool = build_pool(self.config.threads)?;
        let scratch = ScratchPool::new(pool.current_num_threads());
        pool.install(|| self.contract_by_priority(&scratch, pool.current_num_threads()))
    }

    /// Contract exactly `order`, in sequence; every other node stays in the core.
    ///
    /// Reproduces a known ordering, e.g. one taken from a previous hierarchy.
    pub fn run_with_order(self, order: &[NodeId]) -> Result<ContractedGraph> {
        let n = self.graph.n_nodes();
        let mut seen = vec![false; n];
        for &node in order {
            if node.index() >= n || std::mem::replace(&mut seen[node.index()], true) {
                return Err(Error::Configuration(format!(
                    "contraction order lists {node} twice or outside 0..{n}"
                )));
            }
        }

        let pool = build_pool(self.config.threads)?;
        let scratch = ScratchPool::new(pool.current_num_threads());
        pool.install(|| self.contract_in_order(order, &scratch, pool.current_num_threads()))
    }

    fn limits(&self) -> SearchLimits {
        SearchLimits {
            hop_limit: self.config.witness_hop_limit,
            settle_limit: self.config.witness_settle_limit,
        }
    }

    fn tier(&self, node: NodeId) -> u8 {
        if self.components.is_tiny(node, self.config.min_component_size) {
            0
        } else {
            1
        }
    }

    /// Simulate contracting `node` and score it, lower is contracted earlier
    fn priority(&self, node: NodeId, scratch: &ScratchPool) -> i64 {
        let limits = self.limits();
        let (shortcuts, settled) = scratch.with(|s| {
            self.graph
                .in_arcs(node)
                .iter()
                .fold((0i64, 0i64), |(shortcuts, settled), arc| {
                    let (found, searched) = s.shortcuts_from(&self.graph, arc, node, limits);
                    (shortcuts + found.len() as i64, settled + searched as i64)
                })
        });
        let removed = (self.graph.in_arcs(node).len() + self.graph.out_arcs(node).len()) as i64;

        let weights = self.config.priority;
        weights.edge_difference * (shortcuts - removed)
            + weights.deleted_neighbors * self.contracted_neighbours[node.index()] as i64
            + weights.search_space * settled
    }

    fn contract_by_priority(
        mut self,
        scratch: &ScratchPool,
        threads: usize,
    ) -> Result<ContractedGraph> {
        let start = Instant::now();
        let n = self.graph.n_nodes();
        let target = self.config.contraction_target(n);
        info!(nodes = n, arcs = self.graph.n_arcs(), target, threads, "contracting");

        let initial: Vec<i64> = (0..n)
            .into_par_iter()
            .map(|i| self.priority(NodeId::from_index(i), scratch))
            .collect();
        let mut queue = LazyQueue::new(n);
        for (i, priority) in initial.into_iter().enumerate() {
            let node = NodeId::from_index(i);
            queue.push(node, self.tier(node), priority);
        }
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "initial priorities");

        let report_every = (target / 10).max(1);
        let mut contracted = 0usize;
        while contracted < target {
            let stale = queue.pop_stale();
            if !stale.is_empty() {
                let refreshed: Vec<i64> = stale
                    .par_iter()
                    .map(|&node| self.priority(node, scratch))
                    .collect();
                self.stats.priority_updates += stale.len() as u64;
                for (node, priority) in stale.into_iter().zip(refreshed) {
                    queue.push(node, self.tier(node), priority);
                }
                continue;
            }

            let Some((node, _)) = queue.pop_fresh() else {
                break;
            };
            for neighbour in self.contract_node(node, contracted as u32, scratch)? {
                queue.invalidate(neighbour);
            }
            contracted += 1;

            if contracted % report_every == 0 {
                info!(
                    contracted,
                    target,
                    live_arcs = self.graph.n_arcs(),
                    shortcuts = self.stats.shortcuts_inserted,
                    "contraction progress"
                );
            }
        }

        self.finish(threads)
    }

    fn contract_in_order(
        mut self,
        order: &[NodeId],
        scratch: &ScratchPool,
        threads: usize,
    ) -> Result<ContractedGraph> {
        info!(
            nodes = self.graph.n_nodes(),
            ordered = order.len(),
            threads,
            "contracting in given order"
        );
        for (position, &node) in order.iter().enumerate() {
            self.contract_node(node, position as u32, scratch)?;
        }
        self.finish(threads)
    }

    /// Remove `node` from the live graph; returns its former neighbours
    fn contract_node(
        &mut self,
        node: NodeId,
        position: u32,
        scratch: &ScratchPool,
    ) -> Result<Vec<NodeId>> {
        let limits = self.limits();
        let graph = &self.graph;
        let planned: Vec<_> = graph
            .in_arcs(node)
            .par_iter()
            .map(|arc| scratch.with(|s| s.shortcuts_from(graph, arc, node, limits)))
            .collect();

        for (shortcuts, settled) in planned {
            self.stats.witness_searches += 1;
            self.stats.settled_nodes += settled as u64;
            for shortcut in shortcuts {
                if shortcut.weight > Weight::MAX.get() as u64 {
                    return Err(Error::WeightOverflow {
                        from: shortcut.from,
                        via: shortcut.middle,
                        to: shortcut.to,
                    });
                }
                let weight = Weight::new(shortcut.weight as u32);
                if self.graph.insert_or_improve(shortcut.from, shortcut.to, weight, node) {
                    self.stats.shortcuts_inserted += 1;
                }
            }
        }

        self.emit_records(node);
        let neighbours = self.graph.neighbours(node);
        self.graph.remove_node(node);
        for neighbour in &neighbours {
            self.contracted_neighbours[neighbour.index()] += 1;
        }
        self.rank[node.index()] = Some(position);
        self.stats.contracted_nodes += 1;

        Ok(neighbours)
    }

    /// Turn the arcs still attached to `node` into records stored at `node`
    fn emit_records(&mut self, node: NodeId) {
        let mut local = Vec::new();
        for arc in self.graph.out_arcs(node) {
            local.push(record(node, arc, true, false));
        }
        for arc in self.graph.in_arcs(node) {
            local.push(record(node, arc, false, true));
        }
        merge_records(&mut local);
        self.records.append(&mut local);
    }

    fn finish(mut self, threads: usize) -> Result<ContractedGraph> {
        let n = self.graph.n_nodes();
        let is_core: Vec<bool> = self.rank.iter().map(Option::is_none).collect();

        // Arcs left in the live graph run between core nodes
        let mut core_records = Vec::new();
        for (i, _) in is_core.iter().enumerate().filter(|(_, core)| **core) {
            let node = NodeId::from_index(i);
            for arc in self.graph.out_arcs(node) {
                core_records.push(record(node, arc, true, false));
                core_records.push(QueryEdge {
                    source: arc.node,
                    target: node,
                    weight: arc.weight,
                    forward: false,
                    backward: true,
                    shortcut: arc.shortcut,
                    id: arc.id,
                });
            }
        }
        merge_records(&mut core_records);
        self.records.append(&mut core_records);

        let core_nodes = is_core.iter().filter(|&&core| core).count();
        let diagnostics = self.disconnected_components(&is_core, core_nodes);

        self.stats.core_nodes = core_nodes as u64;
        self.stats.emitted_edges = self.records.len() as u64;
        self.stats.threads = threads;
        info!(
            contracted = self.stats.contracted_nodes,
            core = core_nodes,
            shortcuts = self.stats.shortcuts_inserted,
            edges = self.records.len(),
            "contraction finished"
        );

        Ok(ContractedGraph {
            n_nodes: n as u32,
            edges: self.records,
            is_core,
            rank: self.rank,
            stats: self.stats,
            diagnostics,
        })
    }

    /// Routable components with no node left in a non-empty core
    fn disconnected_components(&self, is_core: &[bool], core_nodes: usize) -> Vec<Error> {
        if core_nodes == 0 {
            return Vec::new();
        }
        let mut has_core = vec![false; self.components.len()];
        for (i, _) in is_core.iter().enumerate().filter(|(_, core)| **core) {
            has_core[self.components.component_of(NodeId::from_index(i)).index()] = true;
        }

        let mut diagnostics = Vec::new();
        for (id, &size) in self.components.sizes().iter().enumerate() {
            if has_core[id] || size < self.config.min_component_size {
                continue;
            }
            let diagnostic = Error::DisconnectedCore {
                component: butterfly_common::ComponentId::new(id as u32),
                size,
            };
            warn!("{diagnostic}");
            diagnostics.push(diagnostic);
        }
        diagnostics
    }
}

fn build_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("contract-{i}"))
        .build()
        .map_err(|e| Error::Configuration(format!("cannot build thread pool: {e}")))
}

fn record(source: NodeId, arc: &graph::Arc, forward: bool, backward: bool) -> QueryEdge {
    QueryEdge {
        source,
        target: arc.node,
        weight: arc.weight,
        forward,
        backward,
        shortcut: arc.shortcut,
        id: arc.id,
    }
}

/// Merge a forward and a backward record that describe the same arc
fn merge_records(records: &mut Vec<QueryEdge>) {
    let same = |e: &QueryEdge| (e.source, e.target, e.weight, e.shortcut, e.id);
    records.sort_unstable_by_key(same);

    let mut merged: Vec<QueryEdge> = Vec::with_capacity(records.len());
    for edge in records.drain(..) {
        match merged.last_mut() {
            Some(last) if same(last) == same(&edge) => {
                last.forward |= edge.forward;
                last.backward |= edge.backward;
            }
            _ => merged.push(edge),
        }
    }
    *records = merged;
}
