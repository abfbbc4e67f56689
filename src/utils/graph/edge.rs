//! Edge identifiers for arena graphs.

use std::fmt;

/// A strongly-typed identifier for an edge within a [`DirectedGraph`](crate::utils::graph::DirectedGraph).
///
/// Edge IDs are assigned sequentially as edges are added and index the graph's edge
/// storage. Control-flow analyses rarely need them directly; they identify the edge data
/// (for example [`crate::analysis::CfgEdge`]) attached to a specific source/target pair.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub(crate) usize);

impl EdgeId {
    /// Creates a new `EdgeId` from a raw index value.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        EdgeId(index)
    }

    /// Returns the raw index value of this edge identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}
