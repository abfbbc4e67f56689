//! Natural loop folding.
//!
//! A loop of the region graph is cut out as a sub-problem: edges back to the header become
//! fresh [`Region::Continue`] leaves, edges to the loop's single follow become fresh
//! [`Region::Break`] leaves, and the header is the sub-problem's entry. Once the body has
//! reduced to one region, [`refine`] picks the loop shape.

use std::collections::BTreeSet;

use crate::{
    analysis::cfg::detect_loops,
    structure::{
        graph::{NormalEdges, RegionGraph, RegionNode},
        BranchCondition, LoopKind, Region,
    },
    utils::graph::{algorithms, NodeId},
};

/// A loop of the region graph ready to be cut out.
pub(super) struct LoopPlan {
    /// Header node index
    pub(super) header: usize,
    /// Header block
    pub(super) header_block: NodeId,
    /// Member nodes, header first
    pub(super) members: Vec<usize>,
    /// Node the loop leaves to
    pub(super) follow: Option<usize>,
}

/// Returns the headers and bodies of the outermost loops, in header order.
pub(super) fn outermost_loops(graph: &RegionGraph) -> Vec<(usize, BTreeSet<usize>)> {
    let dominators = algorithms::compute_dominators(graph, NodeId::new(graph.entry_index()));
    let forest = detect_loops(&NormalEdges(graph), &dominators);
    forest
        .outermost()
        .map(|natural| {
            (
                natural.header.index(),
                natural.body.iter().map(|node| node.index()).collect(),
            )
        })
        .collect()
}

/// Completes a loop body with the handlers and exit paths that belong to it.
///
/// Handlers entered only from the body are absorbed when they end the method or rejoin
/// the body or one of its exits. If several exit targets remain, one is kept as the
/// follow (the header's exit if it has one) and the others are absorbed when they are
/// entered only from the body and lead only to other exit targets or nowhere. Returns
/// `None` if more than one exit target is left.
pub(super) fn plan(graph: &RegionGraph, header: usize, body: BTreeSet<usize>) -> Option<LoopPlan> {
    let header_block = graph.node(header)?.entry?;
    let mut body = body;

    loop {
        let exits = exit_targets(graph, &body);
        let mut absorbed = false;
        let handlers: BTreeSet<usize> = body
            .iter()
            .filter_map(|&n| graph.node(n))
            .flat_map(|node| node.succs.iter())
            .filter(|(target, edge)| edge.is_exceptional() && !body.contains(target))
            .map(|(target, _)| *target)
            .collect();
        for handler in handlers {
            if enclosed(graph, &body, handler, |t| body.contains(&t) || exits.contains(&t)) {
                body.insert(handler);
                absorbed = true;
            }
        }
        if !absorbed {
            break;
        }
    }

    let mut exits = exit_targets(graph, &body);
    while exits.len() > 1 {
        let principal = graph
            .node(header)?
            .normal_targets()
            .into_iter()
            .find(|t| exits.contains(t))
            .unwrap_or(exits[0]);
        let absorbable: Vec<usize> = exits
            .iter()
            .copied()
            .filter(|&t| t != principal)
            .filter(|&t| enclosed(graph, &body, t, |succ| exits.contains(&succ)))
            .collect();
        if absorbable.is_empty() {
            return None;
        }
        body.extend(absorbable);
        exits = exit_targets(graph, &body);
    }

    let mut members = vec![header];
    members.extend(body.iter().copied().filter(|&n| n != header));
    Some(LoopPlan {
        header,
        header_block,
        members,
        follow: exits.first().copied(),
    })
}

/// Returns `true` if `node` is entered only from `body` and its normal successors satisfy
/// `allowed`.
fn enclosed(graph: &RegionGraph, body: &BTreeSet<usize>, node: usize, allowed: impl Fn(usize) -> bool) -> bool {
    node != graph.entry_index()
        && graph.preds(node).iter().all(|pred| body.contains(pred))
        && graph
            .node(node)
            .is_some_and(|n| !n.is_jump() && n.normal_targets().into_iter().all(&allowed))
}

/// Returns the distinct normal targets outside `body`, in discovery order.
fn exit_targets(graph: &RegionGraph, body: &BTreeSet<usize>) -> Vec<usize> {
    let mut exits = Vec::new();
    for &member in body {
        let Some(node) = graph.node(member) else {
            continue;
        };
        for target in node.normal_targets() {
            if !body.contains(&target) && !exits.contains(&target) {
                exits.push(target);
            }
        }
    }
    exits
}

/// Builds the sub-problem for a planned loop.
pub(super) fn subgraph(graph: &RegionGraph, plan: &LoopPlan) -> RegionGraph {
    let position = |index: usize| plan.members.iter().position(|&m| m == index);
    let inside = |block: NodeId| {
        graph
            .node_for_block(block)
            .is_some_and(|index| position(index).is_some())
    };

    let mut nodes: Vec<Option<RegionNode>> = Vec::with_capacity(plan.members.len());
    let mut jumps: Vec<RegionNode> = Vec::new();
    for &member in &plan.members {
        let Some(node) = graph.node(member) else {
            nodes.push(None);
            continue;
        };
        let protection: Vec<_> = node
            .protection
            .iter()
            .filter(|entry| inside(entry.handler))
            .cloned()
            .collect();

        let mut succs = Vec::with_capacity(node.succs.len());
        for (target, edge) in &node.succs {
            let jump = if edge.is_exceptional() {
                None
            } else if *target == plan.header {
                Some(Region::Continue(plan.header_block))
            } else if Some(*target) == plan.follow {
                Some(Region::Break(plan.header_block))
            } else {
                None
            };
            if let Some(region) = jump {
                let index = plan.members.len() + jumps.len();
                jumps.push(RegionNode {
                    region,
                    entry: None,
                    exit: None,
                    protection: protection.clone(),
                    succs: Vec::new(),
                });
                succs.push((index, edge.clone()));
            } else if let Some(mapped) = position(*target) {
                if *target != plan.header {
                    succs.push((mapped, edge.clone()));
                }
            }
        }

        nodes.push(Some(RegionNode {
            region: node.region.clone(),
            entry: node.entry,
            exit: node.exit,
            protection,
            succs,
        }));
    }
    nodes.extend(jumps.into_iter().map(Some));
    RegionGraph::new(nodes, 0)
}

/// Shapes a reduced loop body into a loop region.
///
/// `pure_header` tells whether the header block holds nothing but its exit test.
pub(super) fn refine(root: Region, header: NodeId, pure_header: bool) -> Region {
    let items = match root.into_sequence() {
        Region::Sequence(items) => items,
        other => vec![other],
    };

    let while_loop = as_while(&items, header);
    let shaped = if pure_header {
        while_loop.or_else(|| as_do_while(&items, header))
    } else {
        as_do_while(&items, header).or(while_loop)
    };
    if let Some(region) = shaped {
        return region;
    }
    Region::Loop {
        kind: LoopKind::Endless,
        header,
        head: None,
        condition: None,
        body: Box::new(strip_tail_continue(Region::Sequence(items), header)),
    }
}

fn is_jump_arm(region: &Region, jump: &Region) -> bool {
    matches!(region, Region::Sequence(items) if items.len() == 1 && items[0] == *jump)
}

/// `while (cond) { body }`: the loop opens with a test whose one arm leaves it.
fn as_while(items: &[Region], header: NodeId) -> Option<Region> {
    let (
        Region::If {
            head,
            condition,
            then_region,
            else_region,
        },
        rest,
    ) = items.split_first()?
    else {
        return None;
    };
    let exit = Region::Break(header);
    let (stay, arm) = if is_jump_arm(then_region, &exit) {
        (condition.negate(), else_region.as_deref().cloned().unwrap_or_else(Region::empty))
    } else if else_region.as_deref().is_some_and(|arm| is_jump_arm(arm, &exit)) {
        (*condition, (**then_region).clone())
    } else {
        return None;
    };

    let body = Region::sequence(std::iter::once(arm).chain(rest.iter().cloned()));
    Some(Region::Loop {
        kind: LoopKind::While,
        header,
        head: Some(head.clone()),
        condition: Some(stay),
        body: Box::new(strip_tail_continue(body, header)),
    })
}

/// `do { body } while (cond)`: the loop closes with its only `continue`.
fn as_do_while(items: &[Region], header: NodeId) -> Option<Region> {
    let (
        Region::If {
            head,
            condition,
            then_region,
            else_region: Some(else_region),
        },
        rest,
    ) = items.split_last()?
    else {
        return None;
    };
    let (again, exit) = (Region::Continue(header), Region::Break(header));
    let condition: BranchCondition = if is_jump_arm(then_region, &again) && is_jump_arm(else_region, &exit) {
        *condition
    } else if is_jump_arm(then_region, &exit) && is_jump_arm(else_region, &again) {
        condition.negate()
    } else {
        return None;
    };

    let mut continues = 0;
    for item in items {
        item.visit(&mut |region| continues += usize::from(*region == again));
    }
    if continues != 1 {
        return None;
    }

    let body = Region::sequence(rest.iter().cloned().chain(std::iter::once((**head).clone())));
    Some(Region::Loop {
        kind: LoopKind::DoWhile,
        header,
        head: None,
        condition: Some(condition),
        body: Box::new(body),
    })
}

/// Removes a `continue` of `header` that is the last action of the body.
pub(super) fn strip_tail_continue(region: Region, header: NodeId) -> Region {
    match region {
        Region::Sequence(mut items) => {
            match items.pop() {
                Some(Region::Continue(target)) if target == header => {}
                Some(last) => items.push(strip_tail_continue(last, header)),
                None => {}
            }
            Region::Sequence(items)
        }
        Region::If {
            head,
            condition,
            then_region,
            else_region,
        } => Region::If {
            head,
            condition,
            then_region: Box::new(strip_tail_continue(*then_region, header)),
            else_region: else_region.map(|arm| Box::new(strip_tail_continue(*arm, header))),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(n: usize) -> Region {
        Region::Block(NodeId::new(n))
    }

    #[test]
    fn test_refine_while() {
        let header = NodeId::new(1);
        let root = Region::Sequence(vec![
            Region::If {
                head: Box::new(block(1)),
                condition: BranchCondition {
                    block: header,
                    negated: false,
                },
                then_region: Box::new(Region::Sequence(vec![Region::Break(header)])),
                else_region: None,
            },
            block(2),
            Region::Continue(header),
        ]);
        let Region::Loop {
            kind,
            condition,
            body,
            ..
        } = refine(root, header, true)
        else {
            panic!("expected a loop");
        };
        assert_eq!(kind, LoopKind::While);
        assert_eq!(condition.map(|c| c.negated), Some(true));
        assert_eq!(*body, Region::Sequence(vec![block(2)]));
    }

    #[test]
    fn test_refine_do_while() {
        let header = NodeId::new(1);
        let root = Region::Sequence(vec![
            block(1),
            Region::If {
                head: Box::new(block(2)),
                condition: BranchCondition {
                    block: NodeId::new(2),
                    negated: true,
                },
                then_region: Box::new(Region::Sequence(vec![Region::Break(header)])),
                else_region: Some(Box::new(Region::Sequence(vec![Region::Continue(header)]))),
            },
        ]);
        let Region::Loop {
            kind,
            condition,
            body,
            ..
        } = refine(root, header, false)
        else {
            panic!("expected a loop");
        };
        assert_eq!(kind, LoopKind::DoWhile);
        assert_eq!(condition.map(|c| c.negated), Some(false));
        assert_eq!(*body, Region::Sequence(vec![block(1), block(2)]));
    }

    #[test]
    fn test_refine_endless_strips_tail_continue() {
        let header = NodeId::new(0);
        let root = Region::Sequence(vec![block(0), Region::Continue(header)]);
        let Region::Loop { kind, body, .. } = refine(root, header, false) else {
            panic!("expected a loop");
        };
        assert_eq!(kind, LoopKind::Endless);
        assert_eq!(*body, Region::Sequence(vec![block(0)]));
    }
}
