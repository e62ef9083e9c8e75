//! Contraction pipeline: load → components → contract → write

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::components::{find_components, ComponentSummary};
use crate::config::ContractorConfig;
use crate::contractor::{ContractionStats, Contractor};
use crate::formats::{EbgEdgesFile, HierarchyFile};

#[derive(Debug, Clone)]
pub struct PrepareConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub contractor: ContractorConfig,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    pub load_ms: u64,
    pub components_ms: u64,
    pub contract_ms: u64,
    pub write_ms: u64,
    pub total_ms: u64,
}

/// Summary of a pipeline run, serialised as the JSON report
#[derive(Debug, Clone, Serialize)]
pub struct PrepareReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub n_nodes: u32,
    pub input_edges: u64,
    pub output_edges: u64,
    pub shortcuts: u64,
    pub core_nodes: u64,
    pub components: ComponentSummary,
    pub input_edges_crc: String,
    pub edges_crc: String,
    pub file_crc: String,
    pub inputs_sha: String,
    pub output_bytes: u64,
    pub timings: StageTimings,
    pub nodes_per_sec: f64,
    pub edges_per_sec: f64,
    pub contraction: ContractionStats,
    pub diagnostics: Vec<String>,
}

impl PrepareReport {
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
        Ok(())
    }
}

/// SHA-256 of an artifact file
pub fn compute_inputs_sha(path: &Path) -> io::Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    io::copy(&mut BufReader::new(File::open(path)?), &mut hasher)?;
    let mut sha = [0u8; 32];
    sha.copy_from_slice(&hasher.finalize());
    Ok(sha)
}

fn per_sec(count: u64, ms: u64) -> f64 {
    count as f64 * 1000.0 / ms.max(1) as f64
}

/// Run every stage; errors carry the name of the stage that failed
pub fn run_prepare(config: &PrepareConfig) -> Result<PrepareReport> {
    let total = Instant::now();
    let mut timings = StageTimings::default();
    info!(input = %config.input.display(), output = %config.output.display(), "prepare");

    let stage = Instant::now();
    let graph = EbgEdgesFile::read(&config.input).context("load")?;
    let inputs_sha = compute_inputs_sha(&config.input).context("load")?;
    timings.load_ms = stage.elapsed().as_millis() as u64;
    info!(
        nodes = graph.n_nodes,
        edges = graph.edges.len(),
        crc = %format!("0x{:016X}", graph.edges_crc),
        ms = timings.load_ms,
        "loaded edge-expanded graph"
    );

    let stage = Instant::now();
    let min_size = config.contractor.min_component_size;
    let components = find_components(graph.n_nodes, &graph.edges);
    let summary = components.summary(min_size);
    summary.log(min_size);
    timings.components_ms = stage.elapsed().as_millis() as u64;

    let stage = Instant::now();
    let contracted = Contractor::new(graph.n_nodes, &graph.edges, &components, &config.contractor)
        .and_then(Contractor::run)
        .context("contract")?;
    timings.contract_ms = stage.elapsed().as_millis() as u64;
    let stats = contracted.stats.clone();
    let diagnostics: Vec<String> = contracted.diagnostics.iter().map(ToString::to_string).collect();
    info!(
        ms = timings.contract_ms,
        nodes_per_sec = per_sec(stats.contracted_nodes, timings.contract_ms) as u64,
        edges_per_sec = per_sec(stats.input_arcs, timings.contract_ms) as u64,
        "contraction throughput"
    );

    let stage = Instant::now();
    let hierarchy = contracted.into_hierarchy(graph.edges_crc, inputs_sha);
    let written = HierarchyFile::write(&config.output, &hierarchy).context("write")?;
    timings.write_ms = stage.elapsed().as_millis() as u64;
    timings.total_ms = total.elapsed().as_millis() as u64;
    info!(
        path = %config.output.display(),
        bytes = written.bytes,
        crc = %format!("0x{:016X}", written.file_crc),
        "hierarchy written"
    );

    Ok(PrepareReport {
        input: config.input.clone(),
        output: config.output.clone(),
        n_nodes: hierarchy.n_nodes,
        input_edges: graph.edges.len() as u64,
        output_edges: hierarchy.edges.len() as u64,
        shortcuts: hierarchy.shortcut_count() as u64,
        core_nodes: stats.core_nodes,
        components: summary,
        input_edges_crc: format!("0x{:016X}", graph.edges_crc),
        edges_crc: format!("0x{:016X}", written.edges_crc),
        file_crc: format!("0x{:016X}", written.file_crc),
        inputs_sha: hex::encode(inputs_sha),
        output_bytes: written.bytes,
        nodes_per_sec: per_sec(stats.contracted_nodes, timings.contract_ms),
        edges_per_sec: per_sec(stats.input_arcs, timings.contract_ms),
        timings,
        contraction: stats,
        diagnostics,
    })
}
