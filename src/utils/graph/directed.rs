//! Core directed graph implementation.
//!
//! [`DirectedGraph`] stores node data in an arena and edges as index pairs with adjacency
//! lists in both directions. Cyclic control flow is therefore represented without any
//! shared ownership: blocks refer to each other only through [`NodeId`]s.

use crate::{
    utils::graph::{
        edge::EdgeId,
        node::NodeId,
        traits::{GraphBase, Predecessors, Successors},
    },
    Error, Result,
};

#[derive(Debug, Clone)]
struct EdgeData<E> {
    source: NodeId,
    target: NodeId,
    data: E,
}

/// A directed graph with node data `N` and edge data `E`.
///
/// Nodes and edges are never removed; graphs that need pruning (such as the control-flow
/// graph after unreachable-block elimination) are rebuilt with compact ids instead.
///
/// # Examples
///
/// ```rust,ignore
/// use dexscope::utils::graph::DirectedGraph;
///
/// let mut graph: DirectedGraph<&str, u32> = DirectedGraph::new();
/// let a = graph.add_node("a");
/// let b = graph.add_node("b");
/// graph.add_edge(a, b, 7)?;
/// assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b]);
/// ```
#[derive(Debug, Clone)]
pub struct DirectedGraph<N, E> {
    nodes: Vec<N>,
    edges: Vec<EdgeData<E>>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
}

impl<N, E> Default for DirectedGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> DirectedGraph<N, E> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        DirectedGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    /// Creates an empty graph with preallocated storage.
    #[must_use]
    pub fn with_capacity(node_capacity: usize, edge_capacity: usize) -> Self {
        DirectedGraph {
            nodes: Vec::with_capacity(node_capacity),
            edges: Vec::with_capacity(edge_capacity),
            outgoing: Vec::with_capacity(node_capacity),
            incoming: Vec::with_capacity(node_capacity),
        }
    }

    /// Adds a node and returns its id.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(data);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Adds an edge from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either endpoint does not exist.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, data: E) -> Result<EdgeId> {
        for (role, node) in [("source", source), ("target", target)] {
            if node.index() >= self.nodes.len() {
                return Err(Error::GraphError(format!(
                    "{role} node {node} does not exist in graph with {} nodes",
                    self.nodes.len()
                )));
            }
        }

        let id = EdgeId::new(self.edges.len());
        self.edges.push(EdgeData {
            source,
            target,
            data,
        });
        self.outgoing[source.index()].push(id);
        self.incoming[target.index()].push(id);
        Ok(id)
    }

    /// Returns the data of `node`.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes.get(node.index())
    }

    /// Returns the mutable data of `node`.
    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut N> {
        self.nodes.get_mut(node.index())
    }

    /// Iterates over `(id, data)` pairs in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &N)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, data)| (NodeId::new(index), data))
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the data of `edge`.
    #[must_use]
    pub fn edge(&self, edge: EdgeId) -> Option<&E> {
        self.edges.get(edge.index()).map(|e| &e.data)
    }

    /// Returns the `(source, target)` pair of `edge`.
    #[must_use]
    pub fn edge_endpoints(&self, edge: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edges.get(edge.index()).map(|e| (e.source, e.target))
    }

    /// Returns the first edge from `source` to `target`, if any.
    #[must_use]
    pub fn find_edge(&self, source: NodeId, target: NodeId) -> Option<EdgeId> {
        self.outgoing
            .get(source.index())?
            .iter()
            .copied()
            .find(|&edge| self.edges[edge.index()].target == target)
    }

    /// Iterates over the successors of `node` in edge insertion order.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacent(&self.outgoing, node)
            .map(|edge| self.edges[edge.index()].target)
    }

    /// Iterates over the predecessors of `node` in edge insertion order.
    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacent(&self.incoming, node)
            .map(|edge| self.edges[edge.index()].source)
    }

    /// Iterates over `(target, data)` for every outgoing edge of `node`.
    pub fn outgoing_edges(&self, node: NodeId) -> impl Iterator<Item = (NodeId, &E)> + '_ {
        self.adjacent(&self.outgoing, node).map(|edge| {
            let data = &self.edges[edge.index()];
            (data.target, &data.data)
        })
    }

    /// Iterates over `(source, data)` for every incoming edge of `node`.
    pub fn incoming_edges(&self, node: NodeId) -> impl Iterator<Item = (NodeId, &E)> + '_ {
        self.adjacent(&self.incoming, node).map(|edge| {
            let data = &self.edges[edge.index()];
            (data.source, &data.data)
        })
    }

    /// Returns the number of outgoing edges of `node`.
    #[must_use]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.outgoing.get(node.index()).map_or(0, Vec::len)
    }

    /// Returns the number of incoming edges of `node`.
    #[must_use]
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.incoming.get(node.index()).map_or(0, Vec::len)
    }

    fn adjacent<'g>(
        &'g self,
        lists: &'g [Vec<EdgeId>],
        node: NodeId,
    ) -> impl Iterator<Item = EdgeId> + 'g {
        lists
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .copied()
    }
}

impl<N, E> GraphBase for DirectedGraph<N, E> {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::new)
    }
}

impl<N, E> Successors for DirectedGraph<N, E> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        DirectedGraph::successors(self, node)
    }
}

impl<N, E> Predecessors for DirectedGraph<N, E> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        DirectedGraph::predecessors(self, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_diamond_graph() -> DirectedGraph<&'static str, ()> {
        let mut graph = DirectedGraph::new();
        let a = graph.add_node("A");
        let b = graph.add_node("B");
        let c = graph.add_node("C");
        let d = graph.add_node("D");
        graph.add_edge(a, b, ()).unwrap();
        graph.add_edge(a, c, ()).unwrap();
        graph.add_edge(b, d, ()).unwrap();
        graph.add_edge(c, d, ()).unwrap();
        graph
    }

    #[test]
    fn test_new_graph_is_empty() {
        let graph: DirectedGraph<(), ()> = DirectedGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_adjacency() {
        let graph = create_diamond_graph();
        let a = NodeId::new(0);
        let d = NodeId::new(3);

        assert_eq!(
            graph.successors(a).collect::<Vec<_>>(),
            vec![NodeId::new(1), NodeId::new(2)]
        );
        assert_eq!(
            graph.predecessors(d).collect::<Vec<_>>(),
            vec![NodeId::new(1), NodeId::new(2)]
        );
        assert_eq!(graph.out_degree(a), 2);
        assert_eq!(graph.in_degree(a), 0);
        assert!(graph.find_edge(a, NodeId::new(2)).is_some());
        assert!(graph.find_edge(a, d).is_none());
    }

    #[test]
    fn test_edge_data() {
        let mut graph: DirectedGraph<(), &str> = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        let edge = graph.add_edge(a, b, "a->b").unwrap();

        assert_eq!(graph.edge(edge), Some(&"a->b"));
        assert_eq!(graph.edge_endpoints(edge), Some((a, b)));
        assert_eq!(graph.outgoing_edges(a).collect::<Vec<_>>(), vec![(b, &"a->b")]);
        assert_eq!(graph.incoming_edges(b).collect::<Vec<_>>(), vec![(a, &"a->b")]);
    }

    #[test]
    fn test_add_edge_invalid_node() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        assert!(graph.add_edge(a, NodeId::new(5), ()).is_err());
        assert!(graph.add_edge(NodeId::new(5), a, ()).is_err());
    }

    #[test]
    fn test_unknown_node_has_no_neighbours() {
        let graph = create_diamond_graph();
        assert_eq!(graph.successors(NodeId::new(99)).count(), 0);
        assert_eq!(graph.out_degree(NodeId::new(99)), 0);
    }
}
