//! The mutable graph of regions the structurer folds.
//!
//! Nodes start as one [`Region::Block`] per CFG block. Each fold replaces a set of member
//! nodes with one node holding the combined region; the new node takes the slot of the
//! member that was entered from outside, so node indices of untouched nodes stay stable.

use std::collections::BTreeSet;

use crate::{
    analysis::cfg::{CatchEntry, CfgEdge, ControlFlowGraph},
    structure::Region,
    utils::graph::{GraphBase, NodeId, Predecessors, RootedGraph, Successors},
};

/// One node of a [`RegionGraph`].
#[derive(Debug, Clone)]
pub(crate) struct RegionNode {
    /// Structured content
    pub(crate) region: Region,
    /// First CFG block; `None` for synthetic `break`/`continue` leaves
    pub(crate) entry: Option<NodeId>,
    /// CFG block whose terminator selects among the normal successors
    pub(crate) exit: Option<NodeId>,
    /// Handlers protecting the node, in priority order
    pub(crate) protection: Vec<CatchEntry>,
    /// Outgoing edges, exception edges included
    pub(crate) succs: Vec<(usize, CfgEdge)>,
}

impl RegionNode {
    /// Returns `true` for synthetic jump leaves.
    pub(crate) fn is_jump(&self) -> bool {
        self.entry.is_none()
    }

    /// Returns the distinct targets of normal edges, in edge order.
    pub(crate) fn normal_targets(&self) -> Vec<usize> {
        let mut targets = Vec::new();
        for (target, edge) in &self.succs {
            if edge.is_normal() && !targets.contains(target) {
                targets.push(*target);
            }
        }
        targets
    }

    /// Returns the normal edges, in edge order.
    pub(crate) fn normal_edges(&self) -> impl Iterator<Item = (usize, &CfgEdge)> + '_ {
        self.succs
            .iter()
            .filter(|(_, edge)| edge.is_normal())
            .map(|(target, edge)| (*target, edge))
    }

    /// Returns the handler blocks of the protection list.
    pub(crate) fn handler_blocks(&self) -> Vec<NodeId> {
        self.protection.iter().map(|entry| entry.handler).collect()
    }
}

/// Graph of regions under reduction.
#[derive(Debug, Clone)]
pub(crate) struct RegionGraph {
    nodes: Vec<Option<RegionNode>>,
    preds: Vec<Vec<usize>>,
    normal_preds: Vec<Vec<usize>>,
    entry: usize,
}

impl RegionGraph {
    /// Creates one block node per CFG block.
    pub(crate) fn from_cfg(cfg: &ControlFlowGraph) -> Self {
        let nodes = cfg
            .blocks()
            .map(|(id, block)| {
                Some(RegionNode {
                    region: Region::Block(id),
                    entry: Some(id),
                    exit: Some(id),
                    protection: block.protection.clone(),
                    succs: cfg
                        .outgoing(id)
                        .map(|(target, edge)| (target.index(), edge.clone()))
                        .collect(),
                })
            })
            .collect();
        RegionGraph::new(nodes, cfg.entry().index())
    }

    /// Creates a graph over `nodes` and computes predecessor lists.
    pub(crate) fn new(nodes: Vec<Option<RegionNode>>, entry: usize) -> Self {
        let mut graph = RegionGraph {
            nodes,
            preds: Vec::new(),
            normal_preds: Vec::new(),
            entry,
        };
        graph.refresh();
        graph
    }

    fn refresh(&mut self) {
        let count = self.nodes.len();
        self.preds = vec![Vec::new(); count];
        self.normal_preds = vec![Vec::new(); count];
        for (source, node) in self.nodes.iter().enumerate() {
            let Some(node) = node else {
                continue;
            };
            for (target, edge) in &node.succs {
                let Some(preds) = self.preds.get_mut(*target) else {
                    continue;
                };
                if !preds.contains(&source) {
                    preds.push(source);
                }
                if edge.is_normal() && !self.normal_preds[*target].contains(&source) {
                    self.normal_preds[*target].push(source);
                }
            }
        }
    }

    pub(crate) fn entry_index(&self) -> usize {
        self.entry
    }

    pub(crate) fn node(&self, index: usize) -> Option<&RegionNode> {
        self.nodes.get(index).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> Option<&mut RegionNode> {
        self.nodes.get_mut(index).and_then(Option::as_mut)
    }

    /// Iterates over live nodes in index order.
    pub(crate) fn live(&self) -> impl Iterator<Item = (usize, &RegionNode)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| node.as_ref().map(|node| (index, node)))
    }

    pub(crate) fn live_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.nodes.iter().flatten().map(|node| node.succs.len()).sum()
    }

    /// Returns live nodes plus edges; every fold strictly decreases it.
    pub(crate) fn size(&self) -> usize {
        self.live_count() + self.edge_count()
    }

    /// Returns the distinct predecessors of a node, exception edges included.
    pub(crate) fn preds(&self, index: usize) -> &[usize] {
        self.preds.get(index).map_or(&[], Vec::as_slice)
    }

    /// Returns the distinct predecessors along normal edges.
    pub(crate) fn normal_preds(&self, index: usize) -> &[usize] {
        self.normal_preds.get(index).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` once one node remains that does not branch anywhere.
    pub(crate) fn is_reduced(&self) -> bool {
        let mut live = self.live();
        match (live.next(), live.next()) {
            (Some((index, node)), None) => node
                .succs
                .iter()
                .all(|(target, edge)| *target == index && edge.is_exceptional()),
            _ => false,
        }
    }

    /// Returns the node whose region starts at `block`.
    pub(crate) fn node_for_block(&self, block: NodeId) -> Option<usize> {
        self.live()
            .find(|(_, node)| node.entry == Some(block))
            .map(|(index, _)| index)
    }

    /// Returns the number of CFG blocks held by the given nodes.
    pub(crate) fn block_count(&self, members: impl IntoIterator<Item = usize>) -> usize {
        members
            .into_iter()
            .filter_map(|index| self.node(index))
            .map(|node| node.region.block_count())
            .sum()
    }

    /// Returns `true` if both nodes are protected by the same handlers.
    pub(crate) fn same_protection(&self, a: usize, b: usize) -> bool {
        match (self.node(a), self.node(b)) {
            (Some(a), Some(b)) => a.handler_blocks() == b.handler_blocks(),
            _ => false,
        }
    }

    /// Removes a node, returning it.
    pub(crate) fn take(&mut self, index: usize) -> Option<RegionNode> {
        self.nodes.get_mut(index).and_then(Option::take)
    }

    /// Replaces `members` by one node holding `region`.
    ///
    /// `members[0]` must be the member entered from outside; the new node takes its slot,
    /// entry block and protection. `normal` lists the new node's normal edges (targets
    /// among the members become self edges). Exception edges of all members leaving the
    /// member set are merged onto the new node, and every edge into a member is redirected
    /// to it.
    pub(crate) fn fold(
        &mut self,
        members: &[usize],
        region: Region,
        exit: Option<NodeId>,
        normal: Vec<(usize, CfgEdge)>,
    ) -> usize {
        let slot = members[0];
        let member_set: BTreeSet<usize> = members.iter().copied().collect();
        let (entry, protection) = self
            .node(slot)
            .map(|node| (node.entry, node.protection.clone()))
            .unwrap_or_default();

        let mut succs: Vec<(usize, CfgEdge)> = Vec::new();
        for (target, edge) in normal {
            let target = if member_set.contains(&target) { slot } else { target };
            push_edge(&mut succs, target, edge);
        }
        for &member in members {
            let Some(node) = self.take(member) else {
                continue;
            };
            for (target, edge) in node.succs {
                if edge.is_exceptional() && !member_set.contains(&target) {
                    push_edge(&mut succs, target, edge);
                }
            }
        }

        for node in self.nodes.iter_mut().flatten() {
            let mut redirected: Vec<(usize, CfgEdge)> = Vec::with_capacity(node.succs.len());
            for (target, edge) in node.succs.drain(..) {
                let target = if member_set.contains(&target) { slot } else { target };
                push_edge(&mut redirected, target, edge);
            }
            node.succs = redirected;
        }

        self.nodes[slot] = Some(RegionNode {
            region,
            entry,
            exit,
            protection,
            succs,
        });
        self.refresh();
        slot
    }
}

/// Adds an edge, merging it into an existing edge to the same target.
fn push_edge(edges: &mut Vec<(usize, CfgEdge)>, target: usize, edge: CfgEdge) {
    let Some((_, existing)) = edges.iter_mut().find(|(t, _)| *t == target) else {
        edges.push((target, edge));
        return;
    };
    match (existing, edge) {
        (CfgEdge::Exception { handlers }, CfgEdge::Exception { handlers: more }) => {
            for handler in more {
                if !handlers.contains(&handler) {
                    handlers.push(handler);
                }
            }
        }
        (existing, edge) if existing.is_exceptional() && edge.is_normal() => *existing = edge,
        _ => {}
    }
}

impl GraphBase for RegionGraph {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::new)
    }
}

impl Successors for RegionGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.node(node.index())
            .into_iter()
            .flat_map(|node| node.succs.iter().map(|(target, _)| NodeId::new(*target)))
    }
}

impl Predecessors for RegionGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.preds(node.index()).iter().map(|&pred| NodeId::new(pred))
    }
}

impl RootedGraph for RegionGraph {
    fn entry(&self) -> NodeId {
        NodeId::new(self.entry)
    }
}

/// The normal-edge view of a region graph, used to find loops.
///
/// Exception edges take part in dominance but never form a back edge.
pub(crate) struct NormalEdges<'g>(pub(crate) &'g RegionGraph);

impl GraphBase for NormalEdges<'_> {
    fn node_count(&self) -> usize {
        self.0.node_count()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.0.node_ids()
    }
}

impl Successors for NormalEdges<'_> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.0
            .node(node.index())
            .into_iter()
            .flat_map(|node| node.normal_edges().map(|(target, _)| NodeId::new(target)))
    }
}

impl Predecessors for NormalEdges<'_> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.0
            .normal_preds(node.index())
            .iter()
            .map(|&pred| NodeId::new(pred))
    }
}
