//! Trait definitions for graph abstractions.
//!
//! Graph algorithms in this crate are written against these traits rather than a concrete
//! graph type, so the same dominator and traversal code runs on the control-flow graph and
//! on plain [`DirectedGraph`](crate::utils::graph::DirectedGraph) values in tests.
//!
//! - [`GraphBase`] - Node count and node iteration
//! - [`Successors`] - Forward edge traversal
//! - [`Predecessors`] - Backward edge traversal
//! - [`RootedGraph`] - Graphs with a designated entry node

use crate::utils::graph::NodeId;

/// Core graph properties shared by every graph implementation.
pub trait GraphBase {
    /// Returns the number of nodes in the graph.
    fn node_count(&self) -> usize;

    /// Returns an iterator over all node identifiers, in index order.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward adjacency.
pub trait Successors: GraphBase {
    /// Returns the direct successors of `node`.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward adjacency.
pub trait Predecessors: GraphBase {
    /// Returns the direct predecessors of `node`.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// A graph with a single designated entry node.
pub trait RootedGraph: Successors {
    /// Returns the entry node.
    fn entry(&self) -> NodeId;
}
