//! CLI commands for butterfly-contract

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::components::find_components;
use crate::config::ContractorConfig;
use crate::formats::{EbgEdgesFile, HierarchyFile};
use crate::prepare::{run_prepare, PrepareConfig};
use crate::synthetic;
use crate::validate::validate_hierarchy;

#[derive(Parser)]
#[command(name = "butterfly-contract")]
#[command(
    about = "Contraction hierarchy preprocessing for edge-expanded road graphs",
    long_about = None
)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SynthKind {
    Path,
    Grid,
    Random,
    TwoTriangles,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Contract an edge-expanded graph into a hierarchy
    Contract {
        /// Input ebg.edges file
        #[arg(short, long)]
        input: PathBuf,

        /// Output hierarchy file
        #[arg(short, long)]
        output: PathBuf,

        /// TOML file with contraction parameters
        #[arg(long)]
        config: Option<PathBuf>,

        /// Fraction of nodes to contract, overrides the config file
        #[arg(long)]
        core_factor: Option<f64>,

        /// Components below this size are contracted first
        #[arg(long)]
        min_component_size: Option<u32>,

        /// Worker threads (0 = all cores)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Write a JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Compare hierarchy distances with Dijkstra on the input graph
    Validate {
        /// Input ebg.edges file the hierarchy was built from
        #[arg(short, long)]
        input: PathBuf,

        /// Hierarchy file
        #[arg(long)]
        hierarchy: PathBuf,

        /// Number of random source/target pairs
        #[arg(long, default_value = "1000")]
        n_pairs: usize,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Print the connected components of an input graph
    Components {
        /// Input ebg.edges file
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, default_value = "1000")]
        min_component_size: u32,
    },

    /// Generate a synthetic ebg.edges file
    Synth {
        #[arg(long, value_enum)]
        kind: SynthKind,

        /// Approximate node count (ignored by two-triangles)
        #[arg(long, default_value = "100")]
        nodes: u32,

        #[arg(long, default_value = "0")]
        seed: u64,

        /// Output ebg.edges file
        #[arg(short, long)]
        output: PathBuf,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Contract {
                input,
                output,
                config,
                core_factor,
                min_component_size,
                threads,
                report,
            } => {
                let mut contractor = match config {
                    Some(path) => ContractorConfig::from_file(&path).context("config")?,
                    None => ContractorConfig::default(),
                };
                if let Some(core_factor) = core_factor {
                    contractor.core_factor = core_factor;
                }
                if let Some(min_component_size) = min_component_size {
                    contractor.min_component_size = min_component_size;
                }
                if let Some(threads) = threads {
                    contractor.threads = threads;
                }
                contractor.validate().context("config")?;

                println!("\n🦋 Contracting {}...\n", input.display());
                let result = run_prepare(&PrepareConfig {
                    input,
                    output,
                    contractor,
                })?;

                println!("  ✓ {} nodes, {} input edges", result.n_nodes, result.input_edges);
                println!(
                    "  ✓ {} components ({} tiny)",
                    result.components.components, result.components.tiny_components
                );
                println!(
                    "  ✓ {} output edges, {} shortcuts, {} core nodes",
                    result.output_edges, result.shortcuts, result.core_nodes
                );
                for diagnostic in &result.diagnostics {
                    println!("  ⚠ {diagnostic}");
                }
                println!(
                    "  ✓ Written {} ({} bytes, crc {})",
                    result.output.display(),
                    result.output_bytes,
                    result.file_crc
                );
                println!(
                    "  ✓ {} ms total ({:.0} nodes/s)",
                    result.timings.total_ms, result.nodes_per_sec
                );

                if let Some(report) = report {
                    result.write_json(&report)?;
                    println!("  ✓ Report {}", report.display());
                }
            }

            Commands::Validate {
                input,
                hierarchy,
                n_pairs,
                seed,
            } => {
                let graph = EbgEdgesFile::read(&input).context("load")?;
                let contracted = HierarchyFile::read(&hierarchy).context("load")?;
                anyhow::ensure!(
                    contracted.input_edges_crc == graph.edges_crc,
                    "{} was built from a different input (edge crc 0x{:016X}, input has 0x{:016X})",
                    hierarchy.display(),
                    contracted.input_edges_crc,
                    graph.edges_crc
                );

                let result = validate_hierarchy(&graph, &contracted, n_pairs, seed)
                    .context("validate")?;
                result.print();
                anyhow::ensure!(result.passed(), "{} distance mismatches", result.incorrect);
            }

            Commands::Components {
                input,
                min_component_size,
            } => {
                let graph = EbgEdgesFile::read(&input).context("load")?;
                let components = find_components(graph.n_nodes, &graph.edges);
                let summary = components.summary(min_component_size);

                println!("  ✓ {} components", summary.components);
                for (i, size) in summary.largest.iter().enumerate() {
                    println!("    Component {i}: {size} nodes");
                }
                if components.len() > summary.largest.len() {
                    println!(
                        "    ... and {} more small components",
                        components.len() - summary.largest.len()
                    );
                }
                println!(
                    "  ✓ {} tiny components ({} nodes) below {}",
                    summary.tiny_components, summary.tiny_nodes, min_component_size
                );
            }

            Commands::Synth {
                kind,
                nodes,
                seed,
                output,
            } => {
                let graph = match kind {
                    SynthKind::Path => synthetic::path(nodes, seed),
                    SynthKind::Grid => {
                        let side = (nodes as f64).sqrt().ceil().max(1.0) as u32;
                        synthetic::grid(side, side, seed)
                    }
                    SynthKind::Random => synthetic::random(nodes.max(1), nodes as usize * 3, seed),
                    SynthKind::TwoTriangles => synthetic::two_triangles(),
                };
                EbgEdgesFile::write(&output, &graph)?;
                println!(
                    "  ✓ Written {} ({} nodes, {} edges)",
                    output.display(),
                    graph.n_nodes,
                    graph.edges.len()
                );
            }
        }

        Ok(())
    }
}
