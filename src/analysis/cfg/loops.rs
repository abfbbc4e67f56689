//! Natural loop analysis.
//!
//! A back edge is an edge whose target dominates its source. The natural loop of a header
//! is the header plus every block that reaches one of its back-edge sources without passing
//! through the header. Loops sharing a header are merged.
//!
//! # Loop Structure
//!
//! ```text
//!     [header] <------+  <- Single entry point, dominates all loop nodes
//!          |          |
//!          v          |
//!     [body ...]      |
//!          |          |
//!          v          |
//!     [latch] --------+  <- Back edge source(s)
//!          |
//!          v
//!     [exit ...]         <- Outside the loop, with a predecessor inside
//! ```
//!
//! # Loop Types
//!
//! - **Pre-tested** (while): only the header leaves the loop
//! - **Post-tested** (do-while): only the single latch leaves the loop
//! - **Infinite**: nothing leaves the loop
//! - **Complex**: several latches or exits from the middle of the body
//!
//! The classification is structural; the region structurer refines it against the actual
//! condition placement once inner constructs have been folded.
//!
//! [`detect_loops`] works on any graph implementing the graph traits, which is how the
//! structurer reuses it on its region graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::utils::graph::{algorithms::DominatorTree, GraphBase, NodeId, Predecessors, Successors};

/// Classification of loop types based on structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopType {
    /// Pre-tested loop (while): exit condition at header.
    /// ```text
    /// while (cond) { body }
    /// ```
    PreTested,

    /// Post-tested loop (do-while): exit condition at latch.
    /// ```text
    /// do { body } while (cond)
    /// ```
    PostTested,

    /// Infinite loop: no exit edges from loop body.
    /// ```text
    /// while (true) { body }
    /// ```
    Infinite,

    /// Complex loop: multiple latches or irregular exits.
    Complex,
}

/// Exit edge information for a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoopExit {
    /// The block inside the loop that branches out.
    pub exiting_block: NodeId,
    /// The block outside the loop that is the exit target.
    pub exit_block: NodeId,
}

/// A natural loop.
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    /// The header block (single entry point, dominates all loop nodes).
    pub header: NodeId,

    /// All blocks in the loop body, header included.
    pub body: BTreeSet<NodeId>,

    /// Back edge sources, in block order.
    pub latches: Vec<NodeId>,

    /// Exit edges, sorted.
    pub exits: Vec<LoopExit>,

    /// Nesting depth (0 = outermost).
    pub depth: usize,

    /// Structural classification.
    pub loop_type: LoopType,

    /// Header of the enclosing loop.
    pub parent: Option<NodeId>,

    /// Headers of the directly nested loops.
    pub children: Vec<NodeId>,
}

impl NaturalLoop {
    fn new(header: NodeId) -> Self {
        NaturalLoop {
            header,
            body: BTreeSet::from([header]),
            latches: Vec::new(),
            exits: Vec::new(),
            depth: 0,
            loop_type: LoopType::Complex,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Returns `true` if this loop contains the given block.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.body.contains(&node)
    }

    /// Returns the number of blocks in the loop, header included.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Returns the single latch, if there is exactly one.
    #[must_use]
    pub fn single_latch(&self) -> Option<NodeId> {
        match self.latches.as_slice() {
            [latch] => Some(*latch),
            _ => None,
        }
    }

    /// Iterates over the distinct blocks outside the loop that are targets of exit edges.
    pub fn exit_blocks(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.exits
            .iter()
            .map(|exit| exit.exit_block)
            .collect::<BTreeSet<_>>()
            .into_iter()
    }

    /// Iterates over the distinct blocks inside the loop that have exit edges.
    pub fn exiting_blocks(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.exits
            .iter()
            .map(|exit| exit.exiting_block)
            .collect::<BTreeSet<_>>()
            .into_iter()
    }
}

/// All natural loops of a graph with their nesting.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    loops: Vec<NaturalLoop>,
    innermost: Vec<Option<usize>>,
}

impl LoopForest {
    /// Returns the loops, ordered by header.
    #[must_use]
    pub fn loops(&self) -> &[NaturalLoop] {
        &self.loops
    }

    /// Returns the number of loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns `true` if the graph has no loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Returns the innermost loop containing `block`.
    #[must_use]
    pub fn innermost_loop(&self, block: NodeId) -> Option<&NaturalLoop> {
        self.innermost
            .get(block.index())
            .copied()
            .flatten()
            .and_then(|index| self.loops.get(index))
    }

    /// Returns the loop with the given header.
    #[must_use]
    pub fn loop_for_header(&self, header: NodeId) -> Option<&NaturalLoop> {
        self.loops.iter().find(|l| l.header == header)
    }

    /// Returns the number of loops containing `block`.
    #[must_use]
    pub fn loop_depth(&self, block: NodeId) -> usize {
        self.innermost_loop(block).map_or(0, |l| l.depth + 1)
    }

    /// Returns `true` if `block` belongs to any loop.
    #[must_use]
    pub fn is_in_loop(&self, block: NodeId) -> bool {
        self.innermost_loop(block).is_some()
    }

    /// Returns `true` if `header` heads a loop.
    #[must_use]
    pub fn is_header(&self, header: NodeId) -> bool {
        self.loop_for_header(header).is_some()
    }

    /// Iterates over the loops that are not nested in another loop.
    pub fn outermost(&self) -> impl Iterator<Item = &NaturalLoop> {
        self.loops.iter().filter(|l| l.parent.is_none())
    }
}

/// Detects all natural loops of `graph`.
///
/// Only edges between nodes reachable in `dominators` are considered.
#[must_use]
pub fn detect_loops<G>(graph: &G, dominators: &DominatorTree) -> LoopForest
where
    G: GraphBase + Successors + Predecessors,
{
    let mut by_header: BTreeMap<NodeId, NaturalLoop> = BTreeMap::new();

    for node in graph.node_ids() {
        if !dominators.is_reachable(node) {
            continue;
        }
        for succ in graph.successors(node) {
            if dominators.dominates(succ, node) {
                let natural = by_header
                    .entry(succ)
                    .or_insert_with(|| NaturalLoop::new(succ));
                if !natural.latches.contains(&node) {
                    natural.latches.push(node);
                }
                expand_loop_body(graph, dominators, natural, node);
            }
        }
    }

    let mut loops: Vec<NaturalLoop> = by_header.into_values().collect();
    for natural in &mut loops {
        natural.latches.sort();
        compute_exits(graph, natural);
        natural.loop_type = classify_loop(natural);
    }
    compute_nesting(&mut loops);

    let mut innermost: Vec<Option<usize>> = vec![None; graph.node_count()];
    for (index, natural) in loops.iter().enumerate() {
        for &block in &natural.body {
            let Some(slot) = innermost.get_mut(block.index()) else {
                continue;
            };
            let deeper = slot.map_or(true, |current| loops[current].size() > natural.size());
            if deeper {
                *slot = Some(index);
            }
        }
    }

    LoopForest { loops, innermost }
}

/// Adds every block reaching `latch` without passing through the header.
fn expand_loop_body<G>(graph: &G, dominators: &DominatorTree, natural: &mut NaturalLoop, latch: NodeId)
where
    G: Predecessors,
{
    let mut worklist = vec![latch];
    while let Some(node) = worklist.pop() {
        if node == natural.header || !natural.body.insert(node) {
            continue;
        }
        for pred in graph.predecessors(node) {
            if dominators.is_reachable(pred) && !natural.body.contains(&pred) {
                worklist.push(pred);
            }
        }
    }
}

fn compute_exits<G>(graph: &G, natural: &mut NaturalLoop)
where
    G: Successors,
{
    let mut exits = Vec::new();
    for &block in &natural.body {
        for succ in graph.successors(block) {
            if !natural.body.contains(&succ) {
                exits.push(LoopExit {
                    exiting_block: block,
                    exit_block: succ,
                });
            }
        }
    }
    exits.sort();
    exits.dedup();
    natural.exits = exits;
}

fn classify_loop(natural: &NaturalLoop) -> LoopType {
    if natural.exits.is_empty() {
        return LoopType::Infinite;
    }
    if natural.latches.len() > 1 {
        return LoopType::Complex;
    }
    if let Some(latch) = natural.single_latch() {
        if natural.exits.iter().all(|e| e.exiting_block == latch) {
            return LoopType::PostTested;
        }
    }
    if natural.exits.iter().all(|e| e.exiting_block == natural.header) {
        return LoopType::PreTested;
    }
    LoopType::Complex
}

fn compute_nesting(loops: &mut [NaturalLoop]) {
    let count = loops.len();

    // Parent is the smallest other loop containing this header.
    for i in 0..count {
        let header = loops[i].header;
        let parent = (0..count)
            .filter(|&j| j != i && loops[j].contains(header))
            .min_by_key(|&j| loops[j].size())
            .map(|j| loops[j].header);
        loops[i].parent = parent;
    }

    for i in 0..count {
        if let Some(parent) = loops[i].parent {
            let child = loops[i].header;
            if let Some(p) = loops.iter_mut().find(|l| l.header == parent) {
                p.children.push(child);
            }
        }
    }

    for i in 0..count {
        let mut depth = 0;
        let mut current = loops[i].parent;
        while let Some(parent) = current {
            depth += 1;
            if depth > count {
                break;
            }
            current = loops.iter().find(|l| l.header == parent).and_then(|l| l.parent);
        }
        loops[i].depth = depth;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::{algorithms::compute_dominators, DirectedGraph, RootedGraph};

    struct Rooted(DirectedGraph<(), ()>);

    impl GraphBase for Rooted {
        fn node_count(&self) -> usize {
            self.0.node_count()
        }
        fn node_ids(&self) -> impl Iterator<Item = NodeId> {
            (0..self.0.node_count()).map(NodeId::new)
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

    fn graph(nodes: usize, edges: &[(usize, usize)]) -> Rooted {
        let mut g = DirectedGraph::new();
        for _ in 0..nodes {
            g.add_node(());
        }
        for &(a, b) in edges {
            g.add_edge(NodeId::new(a), NodeId::new(b), ()).unwrap();
        }
        Rooted(g)
    }

    #[test]
    fn test_nested_loops() {
        // 0 -> 1 -> 2 -> 3 -> 2, 3 -> 4 -> 1, 1 -> 5
        let g = graph(6, &[(0, 1), (1, 2), (2, 3), (3, 2), (3, 4), (4, 1), (1, 5)]);
        let dom = compute_dominators(&g, NodeId::new(0));
        let forest = detect_loops(&g, &dom);

        assert_eq!(forest.len(), 2);
        let outer = forest.loop_for_header(NodeId::new(1)).unwrap();
        let inner = forest.loop_for_header(NodeId::new(2)).unwrap();
        assert_eq!(outer.size(), 4);
        assert_eq!(inner.size(), 2);
        assert_eq!(inner.parent, Some(NodeId::new(1)));
        assert_eq!(inner.depth, 1);
        assert_eq!(outer.children, vec![NodeId::new(2)]);
        assert_eq!(outer.loop_type, LoopType::PreTested);
        assert_eq!(inner.loop_type, LoopType::PostTested);
        assert_eq!(
            forest.innermost_loop(NodeId::new(3)).map(|l| l.header),
            Some(NodeId::new(2))
        );
        assert_eq!(forest.loop_depth(NodeId::new(4)), 1);
        assert_eq!(forest.outermost().count(), 1);
    }

    #[test]
    fn test_infinite_loop() {
        let g = graph(3, &[(0, 1), (1, 2), (2, 1)]);
        let dom = compute_dominators(&g, NodeId::new(0));
        let forest = detect_loops(&g, &dom);
        assert_eq!(forest.loops()[0].loop_type, LoopType::Infinite);
        assert!(!forest.is_in_loop(NodeId::new(0)));
    }
}
