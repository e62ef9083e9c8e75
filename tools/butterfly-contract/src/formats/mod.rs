//! Binary artifact formats
//!
//! All formats are little-endian with a magic/version header and CRC-64 footers.

pub mod crc;
pub mod ebg_edges;
pub mod hierarchy;

pub use ebg_edges::{Direction, EbgEdges, EbgEdgesFile, InputEdge};
pub use hierarchy::{Hierarchy, HierarchyFile, QueryEdge, WriteSummary};
