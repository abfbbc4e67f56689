//! Control Flow Graph implementation.
//!
//! This module provides the main [`ControlFlowGraph`] structure that wraps basic blocks
//! with graph semantics and gives access to dominator trees, loops and traversals.

use std::{collections::BTreeSet, sync::Arc, sync::OnceLock};

use crate::{
    analysis::cfg::{detect_loops, BasicBlock, CfgEdge, LoopForest},
    bytecode::{ExceptionHandler, Instruction},
    utils::graph::{
        algorithms::{self, DominatorTree},
        DirectedGraph, GraphBase, NodeId, Predecessors, RootedGraph, Successors,
    },
};

/// A control flow graph over the basic blocks of one method.
///
/// Blocks live in an arena and refer to each other only through [`NodeId`]s, so loops in
/// the control flow need no shared ownership. The entry block is always `B0`, every block
/// is reachable from it and block ids are dense.
///
/// # Lazy Computation
///
/// Expensive analyses are computed on first access and cached:
///
/// - [`dominators`](Self::dominators) - Dominator tree
/// - [`dominance_frontiers`](Self::dominance_frontiers) - For SSA phi placement
/// - [`loops`](Self::loops) - Natural loop forest
/// - [`reverse_postorder`](Self::reverse_postorder) - Block order for forward analyses
///
/// # Thread Safety
///
/// `ControlFlowGraph` is [`Send`] and [`Sync`]. Lazy-initialized fields use [`OnceLock`].
#[derive(Debug)]
pub struct ControlFlowGraph {
    graph: DirectedGraph<BasicBlock, CfgEdge>,
    instructions: Arc<[Instruction]>,
    handlers: Arc<[ExceptionHandler]>,
    entry: NodeId,
    exits: Vec<NodeId>,
    dominators: OnceLock<DominatorTree>,
    dominance_frontiers: OnceLock<Vec<BTreeSet<NodeId>>>,
    loops: OnceLock<LoopForest>,
    rpo: OnceLock<Vec<NodeId>>,
}

impl ControlFlowGraph {
    pub(crate) fn new(
        graph: DirectedGraph<BasicBlock, CfgEdge>,
        instructions: Arc<[Instruction]>,
        handlers: Arc<[ExceptionHandler]>,
    ) -> Self {
        let exits = graph
            .node_ids()
            .filter(|&node| graph.outgoing_edges(node).all(|(_, edge)| edge.is_exceptional()))
            .collect();

        ControlFlowGraph {
            graph,
            instructions,
            handlers,
            entry: NodeId::new(0),
            exits,
            dominators: OnceLock::new(),
            dominance_frontiers: OnceLock::new(),
            loops: OnceLock::new(),
            rpo: OnceLock::new(),
        }
    }

    /// Returns the entry block ID.
    #[must_use]
    pub const fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the blocks that leave the method, through `return` or `throw`.
    #[must_use]
    pub fn exits(&self) -> &[NodeId] {
        &self.exits
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns a block by id.
    #[must_use]
    pub fn block(&self, id: NodeId) -> Option<&BasicBlock> {
        self.graph.node(id)
    }

    /// Iterates over all block ids in order.
    pub fn block_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.graph.node_count()).map(NodeId::new)
    }

    /// Iterates over `(id, block)` pairs in id order.
    pub fn blocks(&self) -> impl Iterator<Item = (NodeId, &BasicBlock)> + '_ {
        self.graph.nodes()
    }

    /// Returns the instructions of a block; empty for unknown ids.
    #[must_use]
    pub fn instructions(&self, id: NodeId) -> &[Instruction] {
        self.block(id)
            .and_then(|block| self.instructions.get(block.range.clone()))
            .unwrap_or_default()
    }

    /// Returns the whole instruction array of the method.
    #[must_use]
    pub fn all_instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns the method's exception table.
    #[must_use]
    pub fn handlers(&self) -> &[ExceptionHandler] {
        &self.handlers
    }

    /// Returns the last instruction of a block.
    #[must_use]
    pub fn terminator(&self, id: NodeId) -> Option<&Instruction> {
        self.instructions(id).last()
    }

    /// Iterates over the successors of a block, exceptional ones included.
    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.successors(id)
    }

    /// Iterates over the predecessors of a block, exceptional ones included.
    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.predecessors(id)
    }

    /// Iterates over `(target, edge)` for every outgoing edge of a block.
    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &CfgEdge)> + '_ {
        self.graph.outgoing_edges(id)
    }

    /// Iterates over `(source, edge)` for every incoming edge of a block.
    pub fn incoming(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &CfgEdge)> + '_ {
        self.graph.incoming_edges(id)
    }

    /// Returns the edge from `source` to `target`, if any.
    #[must_use]
    pub fn edge_between(&self, source: NodeId, target: NodeId) -> Option<&CfgEdge> {
        self.graph
            .find_edge(source, target)
            .and_then(|edge| self.graph.edge(edge))
    }

    /// Returns the dominator tree, computing it on first access.
    pub fn dominators(&self) -> &DominatorTree {
        self.dominators
            .get_or_init(|| algorithms::compute_dominators(self, self.entry))
    }

    /// Returns the dominance frontier of every block.
    pub fn dominance_frontiers(&self) -> &[BTreeSet<NodeId>] {
        self.dominance_frontiers
            .get_or_init(|| algorithms::compute_dominance_frontiers(self, self.dominators()))
    }

    /// Returns the natural loop forest.
    pub fn loops(&self) -> &LoopForest {
        self.loops
            .get_or_init(|| detect_loops(self, self.dominators()))
    }

    /// Returns the blocks in reverse post-order from the entry.
    pub fn reverse_postorder(&self) -> &[NodeId] {
        self.rpo
            .get_or_init(|| algorithms::reverse_postorder(self, self.entry))
    }

    /// Returns `true` if block `a` dominates block `b`.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        self.dominators().dominates(a, b)
    }

    /// Returns the block containing the instruction at `offset`.
    #[must_use]
    pub fn block_at_offset(&self, offset: u32) -> Option<NodeId> {
        self.blocks()
            .find(|(_, block)| {
                self.instructions
                    .get(block.range.clone())
                    .is_some_and(|insns| insns.iter().any(|insn| insn.offset == offset))
            })
            .map(|(id, _)| id)
    }
}

impl GraphBase for ControlFlowGraph {
    fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.graph.node_count()).map(NodeId::new)
    }
}

impl Successors for ControlFlowGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.successors(node)
    }
}

impl Predecessors for ControlFlowGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.predecessors(node)
    }
}

impl RootedGraph for ControlFlowGraph {
    fn entry(&self) -> NodeId {
        self.entry
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        analysis::cfg::CfgBuilder,
        bytecode::{BinaryOp, CodeAssembler, IfCondition},
        utils::graph::NodeId,
    };

    #[test]
    fn test_dominators_and_loops() {
        // i = 0; while (i < n) i++; return i;
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 0)
            .label("head")
            .if_cmp(IfCondition::Ge, 0, 1, "done")
            .binary_lit(BinaryOp::Add, 0, 0, 1)
            .goto("head")
            .label("done")
            .return_value(0);
        let method = asm.build_method("a.B", "count", "(I)I", true, 2).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();

        let (entry, head, body, done) = (
            NodeId::new(0),
            NodeId::new(1),
            NodeId::new(2),
            NodeId::new(3),
        );
        assert!(cfg.dominates(entry, done));
        assert!(cfg.dominates(head, body));
        assert!(!cfg.dominates(body, done));
        assert!(cfg.dominance_frontiers()[body.index()].contains(&head));

        let loops = cfg.loops();
        assert_eq!(loops.len(), 1);
        let natural = &loops.loops()[0];
        assert_eq!(natural.header, head);
        assert_eq!(natural.latches, vec![body]);
        assert!(natural.contains(body));
        assert!(!natural.contains(done));
        assert_eq!(natural.exit_blocks().collect::<Vec<_>>(), vec![done]);
        assert_eq!(loops.innermost_loop(body).map(|l| l.header), Some(head));

        assert_eq!(cfg.reverse_postorder()[0], entry);
        assert_eq!(cfg.block_at_offset(1), Some(head));
    }
}
