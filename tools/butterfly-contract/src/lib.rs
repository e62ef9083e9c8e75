//! Contraction hierarchy preprocessing
//!
//! Reads an edge-expanded graph (`ebg.edges`), labels its weakly connected
//! components, contracts nodes in lazy-priority order with bounded witness searches,
//! and commits the resulting hierarchy (`hierarchy.chg`) atomically.

pub mod cli;
pub mod components;
pub mod config;
pub mod contractor;
pub mod formats;
pub mod prepare;
pub mod synthetic;
pub mod validate;

pub use components::{find_components, Components};
pub use config::{ContractorConfig, PriorityWeights};
pub use contractor::{ContractedGraph, ContractionStats, Contractor};
pub use formats::{EbgEdges, EbgEdgesFile, Hierarchy, HierarchyFile, QueryEdge};
pub use prepare::{run_prepare, PrepareConfig, PrepareReport};
pub use validate::{validate_hierarchy, ValidationResult};
