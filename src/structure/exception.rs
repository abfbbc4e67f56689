//! Try/catch folding and `finally` recovery.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    analysis::{
        cfg::{CatchEntry, ControlFlowGraph},
        RegisterLiveness,
    },
    bytecode::{Opcode, Register},
    structure::{
        conditional::follow_edge,
        graph::RegionGraph,
        structurer::Fold,
        CatchClause, Region,
    },
    utils::graph::NodeId,
};

/// Folds `p` with the handlers only `p` transfers to.
///
/// A handler belongs to `p` when no other node is protected by it or throws into it,
/// apart from the handler itself (handlers of `synchronized` blocks protect themselves).
/// Handlers shared with unfolded nodes wait until those nodes join `p`; handlers covering
/// another handler of `p` wait until the inner try has folded.
pub(super) fn try_catch(graph: &RegionGraph, p: usize) -> Option<Fold> {
    let node = graph.node(p)?;
    if node.is_jump() || node.protection.is_empty() {
        return None;
    }

    let mut own: Vec<(CatchEntry, usize)> = Vec::new();
    let mut inherited: Vec<CatchEntry> = Vec::new();
    for entry in &node.protection {
        let handler = graph.node_for_block(entry.handler);
        let owned = handler.filter(|&h| {
            h != p && h != graph.entry_index() && is_exclusive(graph, p, h, entry.handler)
        });
        match owned {
            Some(h) => own.push((entry.clone(), h)),
            None => inherited.push(entry.clone()),
        }
    }
    if own.is_empty() {
        return None;
    }

    let mut members = vec![p];
    members.extend(own.iter().map(|(_, h)| *h));
    let member_set: BTreeSet<usize> = members.iter().copied().collect();

    let mut follows: BTreeSet<usize> = BTreeSet::new();
    for &member in &members {
        for target in graph.node(member)?.normal_targets() {
            if !member_set.contains(&target) {
                follows.insert(target);
            }
        }
    }
    if follows.len() > 1 {
        return None;
    }

    let mut catches = Vec::with_capacity(own.len());
    for (entry, h) in &own {
        catches.push(CatchClause {
            handler: entry.handler,
            catch_types: entry.catch_types.clone(),
            catch_all: entry.catch_all,
            body: graph.node(*h)?.region.clone().into_sequence(),
        });
    }

    Some(Fold {
        members,
        region: Region::TryCatch {
            body: Box::new(node.region.clone().into_sequence()),
            catches,
            finally: None,
        },
        exit: None,
        normal: follow_edge(follows.first().copied()),
        protection: Some(inherited),
    })
}

fn is_exclusive(graph: &RegionGraph, p: usize, h: usize, handler: NodeId) -> bool {
    if graph.preds(h).iter().any(|&pred| pred != p && pred != h) {
        return false;
    }
    graph
        .live()
        .filter(|(index, _)| *index != p && *index != h)
        .all(|(_, other)| other.protection.iter().all(|entry| entry.handler != handler))
}

/// Recognizes `finally` code duplicated on the normal path of a try.
pub(super) struct FinallyMatcher<'a> {
    pub(super) cfg: &'a ControlFlowGraph,
    pub(super) liveness: &'a RegisterLiveness,
}

impl FinallyMatcher<'_> {
    /// Turns a catch-all clause of the try in `fold` into its `finally` body.
    ///
    /// The clause must be `move-exception r; F; throw r` with `F` non-empty, and `F` must
    /// open the follow's first block modulo register renaming, with every register the
    /// copy writes dead after it. Returns the instruction indices the rendering must
    /// skip: the handler's scaffolding and the duplicated copy.
    pub(super) fn merge(&self, graph: &RegionGraph, fold: &mut Fold) -> Option<Vec<usize>> {
        let [(follow, _)] = fold.normal[..] else {
            return None;
        };
        if graph.preds(follow).iter().any(|pred| !fold.members.contains(pred)) {
            return None;
        }
        let copy_block = first_block(&graph.node(follow)?.region)?;

        let Region::TryCatch {
            catches, finally, ..
        } = &mut fold.region
        else {
            return None;
        };
        let position = catches
            .iter()
            .position(|clause| clause.catch_all && clause.catch_types.is_empty())?;

        let handler_indices = linear_indices(self.cfg, &catches[position].body)?;
        let instructions = self.cfg.all_instructions();
        let (&first, rest) = handler_indices.split_first()?;
        let (&last, body) = rest.split_last()?;
        let Opcode::MoveException { dst } = instructions.get(first)?.opcode else {
            return None;
        };
        if !matches!(instructions.get(last)?.opcode, Opcode::Throw { src } if src == dst) {
            return None;
        }
        if body.is_empty() {
            return None;
        }

        let copy_range = self.cfg.block(copy_block)?.range.clone();
        if copy_range.len() < body.len() {
            return None;
        }
        let copy: Vec<usize> = copy_range.take(body.len()).collect();
        let mut renaming = Renaming::default();
        for (&original, &duplicate) in body.iter().zip(&copy) {
            let original = &instructions.get(original)?.opcode;
            let duplicate = &instructions.get(duplicate)?.opcode;
            if original.is_terminator()
                || original.uses().contains(&dst)
                || !renaming.matches(original, duplicate)
            {
                return None;
            }
        }
        let end = *copy.last()?;
        let written: BTreeSet<Register> = copy
            .iter()
            .filter_map(|&index| instructions.get(index)?.opcode.def())
            .collect();
        if written
            .iter()
            .any(|&reg| self.liveness.is_live_after(self.cfg, copy_block, end, reg))
        {
            return None;
        }

        let clause = catches.remove(position);
        *finally = Some(Box::new(clause.body));
        let mut suppressed = vec![first, last];
        suppressed.extend(copy);
        Some(suppressed)
    }
}

/// Returns the instruction indices of a region made of plain blocks only.
fn linear_indices(cfg: &ControlFlowGraph, region: &Region) -> Option<Vec<usize>> {
    let blocks = match region {
        Region::Block(block) => vec![*block],
        Region::Sequence(items) => items
            .iter()
            .map(|item| match item {
                Region::Block(block) => Some(*block),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?,
        _ => return None,
    };
    let mut indices = Vec::new();
    for block in blocks {
        indices.extend(cfg.block(block)?.range.clone());
    }
    Some(indices)
}

/// Returns the block executed first when entering `region`, if it is unconditional.
fn first_block(region: &Region) -> Option<NodeId> {
    match region {
        Region::Block(block) => Some(*block),
        Region::Sequence(items) => first_block(items.first()?),
        Region::If { head, .. } | Region::Switch { head, .. } => first_block(head),
        _ => None,
    }
}

/// A consistent one-to-one register mapping between two instruction runs.
#[derive(Default)]
struct Renaming {
    forward: BTreeMap<Register, Register>,
    backward: BTreeMap<Register, Register>,
}

impl Renaming {
    fn bind(&mut self, from: Register, to: Register) -> bool {
        match (self.forward.get(&from), self.backward.get(&to)) {
            (Some(&mapped), _) if mapped != to => false,
            (_, Some(&mapped)) if mapped != from => false,
            _ => {
                self.forward.insert(from, to);
                self.backward.insert(to, from);
                true
            }
        }
    }

    fn matches(&mut self, original: &Opcode, duplicate: &Opcode) -> bool {
        let (uses, other_uses) = (original.uses(), duplicate.uses());
        if uses.len() != other_uses.len() || original.def().is_some() != duplicate.def().is_some() {
            return false;
        }
        let pairs = uses
            .into_iter()
            .zip(other_uses)
            .chain(original.def().zip(duplicate.def()));
        for (from, to) in pairs {
            if !self.bind(from, to) {
                return false;
            }
        }
        original.map_registers(|reg| self.forward.get(&reg).copied().unwrap_or(reg)) == *duplicate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{BinaryOp, NumericKind, Operand};

    #[test]
    fn test_renaming_is_one_to_one() {
        let mut renaming = Renaming::default();
        let a = Opcode::Binary {
            op: BinaryOp::Add,
            kind: NumericKind::Int,
            dst: 0,
            lhs: 1,
            rhs: Operand::Register(2),
        };
        let b = Opcode::Binary {
            op: BinaryOp::Add,
            kind: NumericKind::Int,
            dst: 3,
            lhs: 4,
            rhs: Operand::Register(5),
        };
        assert!(renaming.matches(&a, &b));

        let mut renaming = Renaming::default();
        let collapsed = Opcode::Binary {
            op: BinaryOp::Add,
            kind: NumericKind::Int,
            dst: 3,
            lhs: 4,
            rhs: Operand::Register(4),
        };
        assert!(!renaming.matches(&a, &collapsed));
    }
}
