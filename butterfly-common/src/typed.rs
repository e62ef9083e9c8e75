//! Strongly typed scalar wrappers
//!
//! Node ids, weights, segment ids and component ids are all plain integers on disk.
//! Wrapping them keeps a weight from being used as a node id by accident. Conversions
//! are explicit: `new`/`get`, or `From<Wrapper>` into the raw scalar.

use std::fmt;

/// Declare a zero-cost newtype around a scalar.
#[macro_export]
macro_rules! strong_typedef {
    ($(#[$meta:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        $vis struct $name($inner);

        impl $name {
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(value: $name) -> $inner {
                value.0
            }
        }
    };
}

strong_typedef! {
    /// Vertex of the edge-expanded graph, `0..n_nodes`.
    pub struct NodeId(u32);
}

strong_typedef! {
    /// Non-negative travel cost.
    pub struct Weight(u32);
}

strong_typedef! {
    /// Original road segment an input edge was derived from.
    pub struct SegmentId(u32);
}

strong_typedef! {
    /// Weakly connected component label.
    pub struct ComponentId(u32);
}

impl NodeId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Panics in debug builds if `index` does not fit a node id.
    #[inline]
    pub fn from_index(index: usize) -> Self {
        debug_assert!(index < u32::MAX as usize);
        NodeId(index as u32)
    }
}

impl Weight {
    /// Largest weight an input edge or shortcut may carry.
    pub const MAX: Weight = Weight(i32::MAX as u32);

    /// Validate a raw on-disk weight. `None` when negative.
    #[inline]
    pub fn from_raw(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(Weight)
    }
}

impl ComponentId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_from_raw_rejects_negative() {
        assert_eq!(Weight::from_raw(-1), None);
        assert_eq!(Weight::from_raw(0), Some(Weight::new(0)));
        assert_eq!(Weight::from_raw(i32::MAX), Some(Weight::MAX));
    }

    #[test]
    fn test_node_id_explicit_conversions() {
        let node = NodeId::from_index(7);
        assert_eq!(node.index(), 7);
        assert_eq!(u32::from(node), 7);
        assert_eq!(node.to_string(), "n7");
    }
}
