//! Contraction parameters
//!
//! Loaded from an optional TOML file and overridden from the command line:
//!
//! ```toml
//! core_factor = 0.9
//! min_component_size = 1000
//! witness_hop_limit = 5
//! witness_settle_limit = 500
//! threads = 0
//!
//! [priority]
//! edge_difference = 2
//! deleted_neighbors = 1
//! search_space = 1
//! ```

use std::path::Path;

use butterfly_common::{suggest_correction, Error, Result};
use serde::{Deserialize, Serialize};

const TOP_LEVEL_KEYS: [&str; 6] = [
    "core_factor",
    "min_component_size",
    "witness_hop_limit",
    "witness_settle_limit",
    "threads",
    "priority",
];
const PRIORITY_KEYS: [&str; 3] = ["edge_difference", "deleted_neighbors", "search_space"];

/// Coefficients of the node ordering heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub edge_difference: i64,
    pub deleted_neighbors: i64,
    pub search_space: i64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            edge_difference: 2,
            deleted_neighbors: 1,
            search_space: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractorConfig {
    /// Fraction of nodes to contract; the rest form the core
    pub core_factor: f64,
    /// Components below this size are contracted first
    pub min_component_size: u32,
    pub witness_hop_limit: u32,
    pub witness_settle_limit: u32,
    /// Worker threads, 0 = all cores
    pub threads: usize,
    pub priority: PriorityWeights,
}

impl Default for ContractorConfig {
    fn default() -> Self {
        Self {
            core_factor: 1.0,
            min_component_size: 1000,
            witness_hop_limit: 5,
            witness_settle_limit: 500,
            threads: 0,
            priority: PriorityWeights::default(),
        }
    }
}

impl ContractorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let table: toml::Table = text
            .parse()
            .map_err(|e| Error::Configuration(format!("invalid TOML: {e}")))?;

        check_keys(table.keys(), &TOP_LEVEL_KEYS, "")?;
        if let Some(priority) = table.get("priority") {
            let priority = priority.as_table().ok_or_else(|| {
                Error::Configuration("`priority` must be a table".to_string())
            })?;
            check_keys(priority.keys(), &PRIORITY_KEYS, "priority.")?;
        }

        let config: ContractorConfig =
            toml::from_str(text).map_err(|e| Error::Configuration(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject thresholds the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.core_factor) {
            return Err(Error::Configuration(format!(
                "core_factor must be within [0, 1], got {}",
                self.core_factor
            )));
        }
        if self.witness_hop_limit == 0 {
            return Err(Error::Configuration("witness_hop_limit must be at least 1".into()));
        }
        if self.witness_settle_limit == 0 {
            return Err(Error::Configuration("witness_settle_limit must be at least 1".into()));
        }
        let PriorityWeights {
            edge_difference,
            deleted_neighbors,
            search_space,
        } = self.priority;
        if edge_difference < 0 || deleted_neighbors < 0 || search_space < 0 {
            return Err(Error::Configuration(
                "priority coefficients must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// Number of nodes contracted before the rest is frozen as core
    pub fn contraction_target(&self, n_nodes: usize) -> usize {
        ((self.core_factor * n_nodes as f64).ceil() as usize).min(n_nodes)
    }
}

fn check_keys<'a>(
    keys: impl Iterator<Item = &'a String>,
    known: &[&str],
    prefix: &str,
) -> Result<()> {
    for key in keys {
        if known.contains(&key.as_str()) {
            continue;
        }
        let message = match suggest_correction(key, known) {
            Some(suggestion) => {
                format!("unknown key `{prefix}{key}`, did you mean `{prefix}{suggestion}`?")
            }
            None => format!("unknown key `{prefix}{key}`"),
        };
        return Err(Error::Configuration(message));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContractorConfig::from_toml_str("").unwrap();
        assert_eq!(config, ContractorConfig::default());
        assert_eq!(config.contraction_target(10), 10);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ContractorConfig::from_toml_str(
            "core_factor = 0.5\n[priority]\nsearch_space = 3\n",
        )
        .unwrap();
        assert_eq!(config.core_factor, 0.5);
        assert_eq!(config.priority.search_space, 3);
        assert_eq!(config.priority.edge_difference, 2);
        assert_eq!(config.witness_hop_limit, 5);
        assert_eq!(config.contraction_target(5), 3);
    }

    #[test]
    fn test_unknown_key_suggests_correction() {
        let err = ContractorConfig::from_toml_str("witness_hop_limt = 3").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("did you mean `witness_hop_limit`"), "{message}");

        let err = ContractorConfig::from_toml_str("[priority]\nsearch_spaec = 1").unwrap_err();
        assert!(err.to_string().contains("`priority.search_space`"));
    }

    #[test]
    fn test_out_of_range_values() {
        for text in [
            "core_factor = -0.1",
            "core_factor = 1.5",
            "core_factor = nan",
            "witness_hop_limit = 0",
            "witness_settle_limit = 0",
            "min_component_size = -4",
            "[priority]\nedge_difference = -1",
        ] {
            let err = ContractorConfig::from_toml_str(text).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{text}: {err}");
        }
    }
}
