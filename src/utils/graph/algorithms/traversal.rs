//! Graph traversal algorithms.
//!
//! - [`postorder`] - Depth-first post-order from a start node
//! - [`reverse_postorder`] - Reverse post-order, the iteration order for forward data flow
//! - [`reachable`] - Reachability marks from a start node
//!
//! All traversals are iterative so that adversarial inputs with very long block chains
//! cannot overflow the stack.

use crate::utils::graph::{NodeId, Successors};

/// Computes the depth-first post-order of the nodes reachable from `start`.
///
/// Successors are explored in the order the graph yields them, so the result is
/// deterministic for a given graph. Nodes not reachable from `start` are omitted.
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }

    let mut visited = vec![false; node_count];
    let mut order = Vec::with_capacity(node_count);
    // (node, successors not yet explored)
    let mut stack: Vec<(NodeId, Vec<NodeId>)> = Vec::new();

    visited[start.index()] = true;
    stack.push((start, pending_successors(graph, start)));

    while let Some((node, pending)) = stack.last_mut() {
        if let Some(next) = pending.pop() {
            if next.index() < node_count && !visited[next.index()] {
                visited[next.index()] = true;
                let successors = pending_successors(graph, next);
                stack.push((next, successors));
            }
        } else {
            order.push(*node);
            stack.pop();
        }
    }

    order
}

/// Computes the reverse post-order of the nodes reachable from `start`.
///
/// In reverse post-order every node appears before its successors, except along back
/// edges. The dominator computation and liveness iteration both rely on this order.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut order = postorder(graph, start);
    order.reverse();
    order
}

/// Marks every node reachable from `start`.
pub fn reachable<G: Successors>(graph: &G, start: NodeId) -> Vec<bool> {
    let mut marks = vec![false; graph.node_count()];
    for node in postorder(graph, start) {
        marks[node.index()] = true;
    }
    marks
}

// Reversed so that popping yields successors in graph order.
fn pending_successors<G: Successors>(graph: &G, node: NodeId) -> Vec<NodeId> {
    let mut successors: Vec<NodeId> = graph.successors(node).collect();
    successors.reverse();
    successors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::DirectedGraph;

    fn graph_from(edges: &[(usize, usize)], nodes: usize) -> DirectedGraph<(), ()> {
        let mut graph = DirectedGraph::new();
        for _ in 0..nodes {
            graph.add_node(());
        }
        for &(a, b) in edges {
            graph.add_edge(NodeId::new(a), NodeId::new(b), ()).unwrap();
        }
        graph
    }

    #[test]
    fn test_postorder_diamond() {
        let graph = graph_from(&[(0, 1), (0, 2), (1, 3), (2, 3)], 4);
        let order: Vec<usize> = postorder(&graph, NodeId::new(0))
            .into_iter()
            .map(NodeId::index)
            .collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
    }

    #[test]
    fn test_reverse_postorder_loop() {
        let graph = graph_from(&[(0, 1), (1, 2), (2, 1), (1, 3)], 4);
        let order = reverse_postorder(&graph, NodeId::new(0));
        assert_eq!(order[0], NodeId::new(0));
        assert_eq!(order[1], NodeId::new(1));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_reachable_skips_orphans() {
        let graph = graph_from(&[(0, 1), (2, 1)], 3);
        let marks = reachable(&graph, NodeId::new(0));
        assert_eq!(marks, vec![true, true, false]);
    }

    #[test]
    fn test_invalid_start() {
        let graph = graph_from(&[], 1);
        assert!(postorder(&graph, NodeId::new(4)).is_empty());
    }
}
