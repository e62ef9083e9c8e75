//! Error types for the butterfly contraction toolkit
//!
//! Every variant except [`Error::DisconnectedCore`] aborts the pipeline. A partially
//! contracted hierarchy silently breaks shortest-path correctness downstream, so there
//! is no degraded output mode.

use std::path::PathBuf;

use strsim::{jaro_winkler, normalized_levenshtein};
use thiserror::Error;

use crate::typed::{ComponentId, NodeId};

/// Main error type for contraction operations
#[derive(Debug, Error)]
pub enum Error {
    /// The input artifact does not exist
    #[error("input artifact not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    /// Checksum, framing or range failure while reading an artifact
    #[error("corrupt input {}: {reason}", path.display())]
    CorruptInput { path: PathBuf, reason: String },

    /// Negative edge weight, or one above `Weight::MAX`
    #[error("invalid weight {weight} on edge {from} -> {to}")]
    InvalidWeight { from: NodeId, to: NodeId, weight: i64 },

    /// A shortcut would exceed `Weight::MAX`
    #[error("shortcut {from} -> {to} via {via} overflows the weight range")]
    WeightOverflow { from: NodeId, via: NodeId, to: NodeId },

    /// The output artifact could not be committed
    #[error("failed to write {}: {source}", path.display())]
    IoWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Nonsensical thresholds or unknown configuration keys
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Diagnostic only: a whole component ended up outside the core
    #[error("component {component} ({size} nodes) has no node in the core")]
    DisconnectedCore { component: ComponentId, size: u32 },

    /// Any other I/O failure while reading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the pipeline must stop on this error
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::DisconnectedCore { .. })
    }
}

/// Convenience result type for contraction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Suggest the closest candidate for a misspelled key.
///
/// Scores are 70% Jaro-Winkler plus 30% normalized Levenshtein. Jaro-Winkler rewards the
/// shared prefixes typical of snake_case keys, and Levenshtein catches dropped letters.
/// Returns `None` on an exact match or when nothing scores at least 0.65.
pub fn suggest_correction<S: AsRef<str>>(input: &str, candidates: &[S]) -> Option<String> {
    let input_lower = input.to_lowercase();
    let min_threshold = 0.65;

    if candidates
        .iter()
        .any(|c| c.as_ref().eq_ignore_ascii_case(input))
    {
        return None;
    }

    let mut best_match = None;
    let mut best_score = 0.0f64;

    for candidate in candidates {
        let candidate_lower = candidate.as_ref().to_lowercase();
        let jw_score = jaro_winkler(&input_lower, &candidate_lower);
        let lev_score = normalized_levenshtein(&input_lower, &candidate_lower);
        let score = jw_score * 0.7 + lev_score * 0.3;

        if score >= min_threshold && score > best_score {
            best_score = score;
            best_match = Some(candidate.as_ref().to_string());
        }
    }

    best_match
}
