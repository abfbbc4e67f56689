//! Arena-based directed graphs and the algorithms the analyses run on them.
//!
//! - [`DirectedGraph`] - adjacency-list graph with node and edge data
//! - [`NodeId`] / [`EdgeId`] - strongly typed indices
//! - [`GraphBase`], [`Successors`], [`Predecessors`], [`RootedGraph`] - traits the
//!   algorithms are written against
//! - [`algorithms`] - traversal, dominators, dominance frontiers

pub mod algorithms;
mod directed;
mod edge;
mod node;
mod traits;

pub use directed::DirectedGraph;
pub use edge::EdgeId;
pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};
