//! Common building blocks for the butterfly contraction toolkit

pub mod error;
pub mod typed;

pub use error::{suggest_correction, Error, Result};
pub use typed::{ComponentId, NodeId, SegmentId, Weight};

#[cfg(test)]
mod tests {
    use crate::error::suggest_correction;

    #[test]
    fn suggest_correction_returns_expected_key() {
        let keys = ["core_factor", "min_component_size", "threads"];
        assert_eq!(
            suggest_correction("core_facter", &keys),
            Some("core_factor".to_string())
        );
    }
}
