//! Dominator tree and dominance frontier computation.
//!
//! A node `d` **dominates** a node `n` if every path from the entry node to `n` passes
//! through `d`. The **immediate dominator** of `n` is the unique strict dominator of `n`
//! that does not strictly dominate any other strict dominator of `n`; making it the parent
//! of `n` yields the dominator tree, rooted at the entry.
//!
//! # Algorithm
//!
//! The tree is computed with the iterative algorithm of Cooper, Harvey and Kennedy
//! ("A Simple, Fast Dominance Algorithm"): nodes are processed in reverse post-order and
//! each immediate dominator is refined by intersecting the dominators of its processed
//! predecessors until nothing changes. Control-flow graphs of single methods are small and
//! mostly reducible, where this converges in two or three passes.
//!
//! Dominance frontiers follow the same paper: for every join node, walk up from each
//! predecessor to the join's immediate dominator, adding the join to the frontier of every
//! node passed.
//!
//! Nodes that are unreachable from the entry have no immediate dominator and are
//! dominated by nothing but themselves.

use std::collections::BTreeSet;

use crate::utils::graph::{algorithms::reverse_postorder, NodeId, Predecessors, RootedGraph};

/// The dominator tree of a rooted graph.
///
/// # Examples
///
/// ```rust,ignore
/// use dexscope::utils::graph::algorithms::compute_dominators;
///
/// let tree = compute_dominators(&graph, entry);
/// assert!(tree.dominates(entry, exit));
/// assert_eq!(tree.immediate_dominator(entry), None);
/// ```
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: NodeId,
    idom: Vec<Option<NodeId>>,
    children: Vec<Vec<NodeId>>,
    depth: Vec<usize>,
}

impl DominatorTree {
    /// Returns the entry node, the root of the tree.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the immediate dominator of `node`, or `None` for the entry and for
    /// unreachable nodes.
    #[inline]
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        if node == self.entry {
            return None;
        }
        self.idom.get(node.index()).copied().flatten()
    }

    /// Returns `true` if `a` dominates `b`. Every node dominates itself.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        // Depth check bounds the walk to the part of the tree above `b`.
        let (Some(&depth_a), Some(&depth_b)) = (self.depth.get(a.index()), self.depth.get(b.index()))
        else {
            return false;
        };
        if depth_a >= depth_b || !self.is_reachable(a) {
            return false;
        }

        let mut current = b;
        while let Some(parent) = self.immediate_dominator(current) {
            if parent == a {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Returns `true` if `a` dominates `b` and `a != b`.
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns `true` if `node` is the entry or has an immediate dominator.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        node == self.entry || self.immediate_dominator(node).is_some()
    }

    /// Returns the dominator-tree children of `node`, in ascending id order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.children.get(node.index()).map_or(&[], Vec::as_slice)
    }

    /// Returns the depth of `node` in the tree; the entry has depth 0.
    #[must_use]
    pub fn depth(&self, node: NodeId) -> usize {
        self.depth.get(node.index()).copied().unwrap_or(0)
    }

    /// Returns the reachable nodes in dominator-tree pre-order.
    ///
    /// Every node appears after its immediate dominator, which is the order SSA renaming
    /// needs to see definitions before the uses they dominate.
    #[must_use]
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.idom.len());
        let mut stack = vec![self.entry];
        while let Some(node) = stack.pop() {
            order.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        order
    }

    /// Returns the number of nodes the tree was computed for.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.idom.len()
    }
}

/// Computes the dominator tree of `graph` rooted at `entry`.
pub fn compute_dominators<G>(graph: &G, entry: NodeId) -> DominatorTree
where
    G: RootedGraph + Predecessors,
{
    let node_count = graph.node_count();
    let order = reverse_postorder(graph, entry);

    // Position in reverse post-order; usize::MAX marks unreachable nodes.
    let mut rpo_index = vec![usize::MAX; node_count];
    for (position, node) in order.iter().enumerate() {
        rpo_index[node.index()] = position;
    }

    let mut idom: Vec<Option<NodeId>> = vec![None; node_count];
    if entry.index() < node_count {
        idom[entry.index()] = Some(entry);
    }

    let mut changed = true;
    while changed {
        changed = false;
        for &node in order.iter().skip(1) {
            let mut new_idom: Option<NodeId> = None;
            for pred in graph.predecessors(node) {
                if pred.index() >= node_count || idom[pred.index()].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(current) => intersect(&idom, &rpo_index, pred, current),
                });
            }
            if new_idom.is_some() && idom[node.index()] != new_idom {
                idom[node.index()] = new_idom;
                changed = true;
            }
        }
    }

    let mut children = vec![Vec::new(); node_count];
    for (index, parent) in idom.iter().enumerate() {
        if let Some(parent) = parent {
            if index != entry.index() {
                children[parent.index()].push(NodeId::new(index));
            }
        }
    }

    let mut depth = vec![0usize; node_count];
    for &node in &order {
        if node != entry {
            if let Some(parent) = idom[node.index()] {
                depth[node.index()] = depth[parent.index()] + 1;
            }
        }
    }

    DominatorTree {
        entry,
        idom,
        children,
        depth,
    }
}

/// Computes the dominator tree of a [`RootedGraph`] from its own entry.
pub fn compute_dominators_rooted<G>(graph: &G) -> DominatorTree
where
    G: RootedGraph + Predecessors,
{
    compute_dominators(graph, graph.entry())
}

fn intersect(
    idom: &[Option<NodeId>],
    rpo_index: &[usize],
    mut a: NodeId,
    mut b: NodeId,
) -> NodeId {
    while a != b {
        while rpo_index[a.index()] > rpo_index[b.index()] {
            match idom[a.index()] {
                Some(parent) => a = parent,
                None => return b,
            }
        }
        while rpo_index[b.index()] > rpo_index[a.index()] {
            match idom[b.index()] {
                Some(parent) => b = parent,
                None => return a,
            }
        }
    }
    a
}

/// Computes the dominance frontier of every node.
///
/// The frontier of `n` holds the nodes where `n`'s dominance ends: join points with one
/// predecessor dominated by `n` and one that is not. SSA construction places phi nodes on
/// the iterated frontier of each register's definition sites.
pub fn compute_dominance_frontiers<G>(graph: &G, tree: &DominatorTree) -> Vec<BTreeSet<NodeId>>
where
    G: Predecessors,
{
    let node_count = graph.node_count();
    let mut frontiers = vec![BTreeSet::new(); node_count];

    for index in 0..node_count {
        let node = NodeId::new(index);
        if !tree.is_reachable(node) {
            continue;
        }
        let preds: Vec<NodeId> = graph
            .predecessors(node)
            .filter(|&pred| tree.is_reachable(pred))
            .collect();
        if preds.len() < 2 {
            continue;
        }
        let Some(idom) = tree.immediate_dominator(node) else {
            // The entry can still be a join (a loop back to the first block); every
            // predecessor chain then runs up to the entry itself.
            for pred in preds {
                let mut runner = pred;
                loop {
                    frontiers[runner.index()].insert(node);
                    match tree.immediate_dominator(runner) {
                        Some(parent) => runner = parent,
                        None => break,
                    }
                }
            }
            continue;
        };
        for pred in preds {
            let mut runner = pred;
            while runner != idom {
                frontiers[runner.index()].insert(node);
                match tree.immediate_dominator(runner) {
                    Some(parent) => runner = parent,
                    None => break,
                }
            }
        }
    }

    frontiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::{DirectedGraph, GraphBase, Successors};

    struct Rooted(DirectedGraph<(), ()>);

    impl GraphBase for Rooted {
        fn node_count(&self) -> usize {
            self.0.node_count()
        }
        fn node_ids(&self) -> impl Iterator<Item = NodeId> {
            GraphBase::node_ids(&self.0)
        }
    }

    impl Successors for Rooted {
        fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.0.successors(node)
        }
    }

    impl Predecessors for Rooted {
        fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.0.predecessors(node)
        }
    }

    impl RootedGraph for Rooted {
        fn entry(&self) -> NodeId {
            NodeId::new(0)
        }
    }

    fn graph_from(edges: &[(usize, usize)], nodes: usize) -> Rooted {
        let mut graph = DirectedGraph::new();
        for _ in 0..nodes {
            graph.add_node(());
        }
        for &(a, b) in edges {
            graph.add_edge(NodeId::new(a), NodeId::new(b), ()).unwrap();
        }
        Rooted(graph)
    }

    fn n(index: usize) -> NodeId {
        NodeId::new(index)
    }

    #[test]
    fn test_diamond_dominators() {
        let graph = graph_from(&[(0, 1), (0, 2), (1, 3), (2, 3)], 4);
        let tree = compute_dominators_rooted(&graph);

        assert_eq!(tree.immediate_dominator(n(0)), None);
        assert_eq!(tree.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(tree.immediate_dominator(n(3)), Some(n(0)));
        assert!(tree.dominates(n(0), n(3)));
        assert!(!tree.dominates(n(1), n(3)));
        assert!(tree.strictly_dominates(n(0), n(1)));
        assert!(!tree.strictly_dominates(n(1), n(1)));
        assert_eq!(tree.children(n(0)), &[n(1), n(2), n(3)]);
        assert_eq!(tree.depth(n(3)), 1);
    }

    #[test]
    fn test_loop_dominators() {
        // 0 -> 1 -> 2 -> 1, 1 -> 3
        let graph = graph_from(&[(0, 1), (1, 2), (2, 1), (1, 3)], 4);
        let tree = compute_dominators_rooted(&graph);

        assert_eq!(tree.immediate_dominator(n(2)), Some(n(1)));
        assert_eq!(tree.immediate_dominator(n(3)), Some(n(1)));
        assert!(tree.dominates(n(1), n(2)));
        assert_eq!(tree.preorder(), vec![n(0), n(1), n(2), n(3)]);
    }

    #[test]
    fn test_unreachable_node() {
        let graph = graph_from(&[(0, 1), (2, 1)], 3);
        let tree = compute_dominators_rooted(&graph);

        assert!(!tree.is_reachable(n(2)));
        assert!(!tree.dominates(n(2), n(1)));
        assert_eq!(tree.immediate_dominator(n(1)), Some(n(0)));
    }

    #[test]
    fn test_dominance_frontiers() {
        let graph = graph_from(&[(0, 1), (0, 2), (1, 3), (2, 3)], 4);
        let tree = compute_dominators_rooted(&graph);
        let frontiers = compute_dominance_frontiers(&graph, &tree);

        assert!(frontiers[1].contains(&n(3)));
        assert!(frontiers[2].contains(&n(3)));
        assert!(frontiers[0].is_empty());
        assert!(frontiers[3].is_empty());
    }

    #[test]
    fn test_loop_header_in_own_frontier() {
        let graph = graph_from(&[(0, 1), (1, 2), (2, 1), (1, 3)], 4);
        let tree = compute_dominators_rooted(&graph);
        let frontiers = compute_dominance_frontiers(&graph, &tree);

        assert!(frontiers[2].contains(&n(1)));
        assert!(frontiers[1].contains(&n(1)));
    }
}
