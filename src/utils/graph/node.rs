//! Node identifiers for arena graphs.
//!
//! [`NodeId`] is the handle used for basic blocks in the control-flow graph and for nodes
//! of every graph algorithm in [`crate::utils::graph::algorithms`]. Per-node analysis
//! results are stored in vectors indexed by [`NodeId::index`].

use std::fmt;

/// A strongly-typed identifier for a node within a [`DirectedGraph`](crate::utils::graph::DirectedGraph).
///
/// Node IDs are assigned sequentially starting from 0 as nodes are added. For control-flow
/// graphs the id of a basic block doubles as its block number, and the entry block is
/// always `NodeId(0)`.
///
/// # Examples
///
/// ```rust,ignore
/// use dexscope::utils::graph::{DirectedGraph, NodeId};
///
/// let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
/// let entry = graph.add_node("entry");
/// assert_eq!(entry, NodeId::new(0));
/// assert_eq!(entry.index(), 0);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new `NodeId` from a raw index value.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index value of this node identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    /// Block-style display, `B3`, used in listings and goto labels.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    #[inline]
    fn from(node: NodeId) -> Self {
        node.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_roundtrip() {
        let node = NodeId::new(7);
        assert_eq!(node.index(), 7);
        assert_eq!(usize::from(node), 7);
        assert_eq!(NodeId::from(7), node);
    }

    #[test]
    fn test_node_id_formatting() {
        let node = NodeId::new(3);
        assert_eq!(format!("{node:?}"), "NodeId(3)");
        assert_eq!(node.to_string(), "B3");
    }

    #[test]
    fn test_node_id_ordering() {
        let mut nodes = vec![NodeId::new(2), NodeId::new(0), NodeId::new(1)];
        nodes.sort();
        assert_eq!(nodes, vec![NodeId::new(0), NodeId::new(1), NodeId::new(2)]);
    }
}
