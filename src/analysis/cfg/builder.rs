//! Instruction graph construction.
//!
//! [`CfgBuilder`] turns the instruction stream and exception table of one method into a
//! [`ControlFlowGraph`]. Construction runs in four passes:
//!
//! 1. **Validation** - offsets must increase, branch targets and handler offsets must name
//!    instruction starts, `move-result` must follow an invoke with a result, and control
//!    must not fall off the end of the code. Violations are [`crate::Error::Decode`].
//! 2. **Leaders** - a block starts at the entry, at every branch or switch target, after
//!    every control transfer, at every handler entry, at both ends of every protected range
//!    and after every throwing instruction inside a protected range.
//! 3. **Edges** - fall-through, branch, switch and exception edges, with parallel edges
//!    merged so that every pair of blocks is joined by at most one edge.
//!    When the first instruction is itself a branch target, an empty entry block is
//!    placed in front of it so the entry never has predecessors.
//! 4. **Pruning** - blocks unreachable from the entry are dropped and the rest renumbered
//!    densely, so no later stage ever observes a dangling edge.

use std::ops::Range;

use tracing::debug;

use crate::{
    analysis::cfg::{BasicBlock, CatchEntry, CfgEdge, ControlFlowGraph},
    bytecode::{FlowType, Instruction, MethodCode, Opcode},
    types::{JavaType, TypeRef},
    utils::graph::{DirectedGraph, NodeId},
    Result,
};

/// A protected range after validation, in instruction indices.
#[derive(Debug)]
struct ProtectedRange {
    table_index: usize,
    covered: Range<usize>,
    handler: usize,
}

/// A block before pruning, with successors as indices into the pre-pruning block list.
#[derive(Debug)]
struct RawBlock {
    range: Range<usize>,
    catches: Vec<(usize, Vec<usize>)>,
    throw_point: Option<usize>,
    edges: Vec<(usize, CfgEdge)>,
}

/// Builds control flow graphs from method code.
///
/// # Examples
///
/// ```rust,ignore
/// use dexscope::analysis::CfgBuilder;
///
/// let cfg = CfgBuilder::build(&method)?;
/// println!("{} blocks, entry {}", cfg.block_count(), cfg.entry());
/// ```
pub struct CfgBuilder<'m> {
    method: &'m MethodCode,
    ranges: Vec<ProtectedRange>,
}

impl<'m> CfgBuilder<'m> {
    /// Builds the control flow graph of `method`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] for malformed offsets, targets, handler ranges,
    /// misplaced `move-result`/`move-exception` instructions and code that falls off the end.
    pub fn build(method: &'m MethodCode) -> Result<ControlFlowGraph> {
        let mut builder = CfgBuilder {
            method,
            ranges: Vec::new(),
        };
        builder.validate()?;
        builder.collect_ranges()?;
        builder.validate_handler_entries()?;

        let blocks = builder.split_blocks();
        let mut raw = builder.connect(&blocks)?;
        isolate_entry(&mut raw);
        let cfg = builder.prune(raw)?;

        debug!(
            method = %method.name,
            instructions = method.instructions.len(),
            blocks = cfg.block_count(),
            edges = cfg.edge_count(),
            "built control flow graph"
        );
        Ok(cfg)
    }

    fn instructions(&self) -> &'m [Instruction] {
        &self.method.instructions
    }

    fn end_offset(&self) -> u32 {
        self.instructions()
            .last()
            .map_or(0, Instruction::next_offset)
    }

    /// Returns the index of the instruction starting at `offset`.
    fn index_of(&self, offset: u32) -> Option<usize> {
        self.instructions()
            .binary_search_by_key(&offset, |insn| insn.offset)
            .ok()
    }

    fn validate(&self) -> Result<()> {
        let insns = self.instructions();
        let Some(last) = insns.last() else {
            return Err(decode_error!(0, "method has no instructions"));
        };

        for pair in insns.windows(2) {
            if pair[1].offset <= pair[0].offset {
                return Err(decode_error!(
                    pair[1].offset,
                    "instruction offset does not increase (previous at {:#06x})",
                    pair[0].offset
                ));
            }
        }

        let frame = self.method.registers;
        for insn in insns {
            let mut registers = insn.opcode.uses().into_iter().chain(insn.opcode.def());
            if let Some(register) = registers.find(|&r| r >= frame) {
                return Err(decode_error!(
                    insn.offset,
                    "register v{} outside a frame of {}",
                    register,
                    frame
                ));
            }
        }

        let mut targeted = vec![false; insns.len()];
        for insn in insns {
            for target in insn.opcode.branch_targets() {
                let Some(index) = self.index_of(target) else {
                    return Err(decode_error!(
                        insn.offset,
                        "branch target {:#06x} is not an instruction start (code ends at {:#06x})",
                        target,
                        self.end_offset()
                    ));
                };
                targeted[index] = true;
            }
        }

        for (index, insn) in insns.iter().enumerate() {
            if !matches!(insn.opcode, Opcode::MoveResult { .. }) {
                continue;
            }
            if targeted[index] {
                return Err(decode_error!(insn.offset, "move-result is a branch target"));
            }
            let paired = index
                .checked_sub(1)
                .and_then(|prev| insns.get(prev))
                .is_some_and(|prev| match &prev.opcode {
                    Opcode::Invoke { method, .. } => method.descriptor.ret != JavaType::Void,
                    _ => false,
                });
            if !paired {
                return Err(decode_error!(
                    insn.offset,
                    "move-result does not follow an invoke with a result"
                ));
            }
        }

        if last.opcode.can_fall_through() {
            return Err(decode_error!(
                last.offset,
                "execution falls off the end of the method"
            ));
        }
        Ok(())
    }

    fn collect_ranges(&mut self) -> Result<()> {
        let insns = self.instructions();
        let end_offset = self.end_offset();
        let is_move_result =
            |index: usize| matches!(insns.get(index), Some(insn) if matches!(insn.opcode, Opcode::MoveResult { .. }));

        let method = self.method;
        for (table_index, handler) in method.handlers.iter().enumerate() {
            if handler.start >= handler.end {
                continue;
            }
            let Some(mut start) = self.index_of(handler.start) else {
                return Err(decode_error!(
                    handler.start,
                    "protected range start is not an instruction start"
                ));
            };
            let mut end = if handler.end == end_offset {
                insns.len()
            } else {
                self.index_of(handler.end).ok_or_else(|| {
                    decode_error!(
                        handler.end,
                        "protected range end is not an instruction boundary"
                    )
                })?
            };
            let Some(entry) = self.index_of(handler.handler) else {
                return Err(decode_error!(
                    handler.handler,
                    "exception handler is not an instruction start"
                ));
            };
            if is_move_result(entry) {
                return Err(decode_error!(
                    handler.handler,
                    "exception handler starts with move-result"
                ));
            }

            // An invoke and its move-result are one computation; never split them.
            if is_move_result(start) {
                start += 1;
            }
            if is_move_result(end) {
                end += 1;
            }
            if start >= end {
                continue;
            }

            self.ranges.push(ProtectedRange {
                table_index,
                covered: start..end,
                handler: entry,
            });
        }
        Ok(())
    }

    fn validate_handler_entries(&self) -> Result<()> {
        for (index, insn) in self.instructions().iter().enumerate() {
            if matches!(insn.opcode, Opcode::MoveException { .. })
                && !self.ranges.iter().any(|range| range.handler == index)
            {
                return Err(decode_error!(
                    insn.offset,
                    "move-exception outside an exception handler entry"
                ));
            }
        }
        Ok(())
    }

    /// Returns the exception table indices covering instruction `index`, in priority order.
    fn coverage(&self, index: usize) -> Vec<usize> {
        self.ranges
            .iter()
            .filter(|range| range.covered.contains(&index))
            .map(|range| range.table_index)
            .collect()
    }

    fn split_blocks(&self) -> Vec<Range<usize>> {
        let insns = self.instructions();
        let count = insns.len();
        let mut leader = vec![false; count];
        leader[0] = true;

        for (index, insn) in insns.iter().enumerate() {
            for target in insn.opcode.branch_targets() {
                if let Some(target) = self.index_of(target) {
                    leader[target] = true;
                }
            }
            if insn.opcode.is_terminator() && index + 1 < count {
                leader[index + 1] = true;
            }
            if insn.opcode.can_throw() && !self.coverage(index).is_empty() {
                let next = match insns.get(index + 1) {
                    Some(Instruction {
                        opcode: Opcode::MoveResult { .. },
                        ..
                    }) => index + 2,
                    _ => index + 1,
                };
                if next < count {
                    leader[next] = true;
                }
            }
        }
        for range in &self.ranges {
            leader[range.handler] = true;
            leader[range.covered.start] = true;
            if range.covered.end < count {
                leader[range.covered.end] = true;
            }
        }

        let starts: Vec<usize> = (0..count).filter(|&index| leader[index]).collect();
        starts
            .iter()
            .enumerate()
            .map(|(position, &start)| start..starts.get(position + 1).copied().unwrap_or(count))
            .collect()
    }

    fn connect(&self, blocks: &[Range<usize>]) -> Result<Vec<RawBlock>> {
        let insns = self.instructions();
        let mut block_at = vec![usize::MAX; insns.len()];
        for (block, range) in blocks.iter().enumerate() {
            block_at[range.start] = block;
        }
        let block_of_offset = |offset: u32| -> Result<usize> {
            self.index_of(offset)
                .map(|index| block_at[index])
                .filter(|&block| block != usize::MAX)
                .ok_or_else(|| malformed_error!("branch target {:#06x} does not start a block", offset))
        };

        let mut raw = Vec::with_capacity(blocks.len());
        for (block, range) in blocks.iter().enumerate() {
            let Some(last) = insns.get(range.end - 1) else {
                return Err(malformed_error!("empty block {}", block));
            };
            let next = (range.end < insns.len()).then(|| block_at[range.end]);
            let fallthrough = || {
                next.ok_or_else(|| decode_error!(last.offset, "execution falls off the end of the method"))
            };

            let mut edges: Vec<(usize, CfgEdge)> = Vec::new();
            match (&last.opcode, last.opcode.flow_type()) {
                (_, FlowType::Sequential) => edges.push((fallthrough()?, CfgEdge::Unconditional)),
                (Opcode::If { target, .. }, FlowType::ConditionalBranch) => {
                    let taken = block_of_offset(*target)?;
                    let not_taken = fallthrough()?;
                    if taken == not_taken {
                        edges.push((taken, CfgEdge::Unconditional));
                    } else {
                        edges.push((taken, CfgEdge::ConditionalTrue));
                        edges.push((not_taken, CfgEdge::ConditionalFalse));
                    }
                }
                (Opcode::Goto { target }, _) => {
                    edges.push((block_of_offset(*target)?, CfgEdge::Unconditional));
                }
                (Opcode::Switch { cases, .. }, _) => {
                    for &(key, target) in cases {
                        let target = block_of_offset(target)?;
                        match edges.iter_mut().find(|(existing, _)| *existing == target) {
                            Some((_, CfgEdge::Switch { cases, .. })) => cases.push(key),
                            _ => edges.push((
                                target,
                                CfgEdge::Switch {
                                    cases: vec![key],
                                    default: false,
                                },
                            )),
                        }
                    }
                    let default_block = fallthrough()?;
                    match edges.iter_mut().find(|(existing, _)| *existing == default_block) {
                        Some((_, CfgEdge::Switch { default, .. })) => *default = true,
                        _ => edges.push((
                            default_block,
                            CfgEdge::Switch {
                                cases: Vec::new(),
                                default: true,
                            },
                        )),
                    }
                }
                _ => {}
            }

            let catches = self.group_catches(range.start, &block_at);
            let mut throw_point = None;
            if !catches.is_empty() {
                if let Some(index) = range.clone().rev().find(|&i| insns[i].opcode.can_throw()) {
                    for (handler, table) in &catches {
                        if edges.iter().any(|(target, _)| target == handler) {
                            continue;
                        }
                        edges.push((
                            *handler,
                            CfgEdge::Exception {
                                handlers: table.clone(),
                            },
                        ));
                        throw_point = Some(index);
                    }
                }
            }

            raw.push(RawBlock {
                range: range.clone(),
                catches,
                throw_point,
                edges,
            });
        }
        Ok(raw)
    }

    /// Groups the handlers covering the instruction at `index` by handler block.
    ///
    /// Entries after the first catch-all can never be selected and are dropped.
    fn group_catches(&self, index: usize, block_at: &[usize]) -> Vec<(usize, Vec<usize>)> {
        let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
        for table_index in self.coverage(index) {
            let Some(range) = self.ranges.iter().find(|r| r.table_index == table_index) else {
                continue;
            };
            let block = block_at[range.handler];
            match groups.iter_mut().find(|(existing, _)| *existing == block) {
                Some((_, entries)) => entries.push(table_index),
                None => groups.push((block, vec![table_index])),
            }
            if self.method.handlers[table_index].is_catch_all() {
                break;
            }
        }
        groups
    }

    fn prune(&self, raw: Vec<RawBlock>) -> Result<ControlFlowGraph> {
        let mut reachable = vec![false; raw.len()];
        let mut stack = vec![0usize];
        while let Some(block) = stack.pop() {
            if std::mem::replace(&mut reachable[block], true) {
                continue;
            }
            for (target, _) in &raw[block].edges {
                if !reachable[*target] {
                    stack.push(*target);
                }
            }
        }

        let mut renumbered = vec![None; raw.len()];
        let mut next = 0usize;
        for (old, live) in reachable.iter().enumerate() {
            if *live {
                renumbered[old] = Some(NodeId::new(next));
                next += 1;
            }
        }

        let insns = self.instructions();
        let start_of = |range: &Range<usize>| insns.get(range.start).map_or(0, |insn| insn.offset);
        let mut graph: DirectedGraph<BasicBlock, CfgEdge> =
            DirectedGraph::with_capacity(next, next * 2);
        for (old, block) in raw.iter().enumerate() {
            if renumbered[old].is_none() {
                continue;
            }
            let protection = block
                .catches
                .iter()
                .filter_map(|(handler, table)| {
                    let handler = renumbered[*handler]?;
                    Some(self.catch_entry(handler, table))
                })
                .collect();
            graph.add_node(BasicBlock {
                start: start_of(&block.range),
                range: block.range.clone(),
                protection,
                throw_point: block.throw_point,
            });
        }
        for (old, block) in raw.into_iter().enumerate() {
            let Some(source) = renumbered[old] else {
                continue;
            };
            for (target, edge) in block.edges {
                let Some(target) = renumbered[target] else {
                    return Err(malformed_error!("edge into pruned block {}", target));
                };
                graph.add_edge(source, target, edge)?;
            }
        }

        Ok(ControlFlowGraph::new(
            graph,
            self.method.instructions.clone(),
            self.method.handlers.clone(),
        ))
    }

    fn catch_entry(&self, handler: NodeId, table: &[usize]) -> CatchEntry {
        let mut catch_types: Vec<TypeRef> = Vec::new();
        let mut catch_all = false;
        for &index in table {
            match &self.method.handlers[index].catch_type {
                Some(class) if !catch_types.contains(class) => catch_types.push(class.clone()),
                Some(_) => {}
                None => catch_all = true,
            }
        }
        CatchEntry {
            handler,
            catch_types,
            catch_all,
        }
    }
}

/// Prepends an empty block when some edge leads back to the first block.
fn isolate_entry(raw: &mut Vec<RawBlock>) {
    let targeted = raw
        .iter()
        .any(|block| block.edges.iter().any(|(target, _)| *target == 0));
    if !targeted {
        return;
    }
    for block in raw.iter_mut() {
        for (target, _) in &mut block.edges {
            *target += 1;
        }
        for (handler, _) in &mut block.catches {
            *handler += 1;
        }
    }
    raw.insert(
        0,
        RawBlock {
            range: 0..0,
            catches: Vec::new(),
            throw_point: None,
            edges: vec![(1, CfgEdge::Unconditional)],
        },
    );
}

#[cfg(test)]
mod tests {
    use crate::{
        analysis::cfg::{CfgBuilder, CfgEdge},
        bytecode::{CodeAssembler, IfCondition, InvokeKind, MethodRef},
        utils::graph::NodeId,
        Error,
    };

    fn max_method(asm: &CodeAssembler) -> crate::bytecode::MethodCode {
        asm.build_method("a.B", "max", "(II)I", true, 2).unwrap()
    }

    #[test]
    fn test_if_else_blocks() {
        let mut asm = CodeAssembler::new();
        asm.if_cmp(IfCondition::Le, 0, 1, "else")
            .return_value(0)
            .label("else")
            .return_value(1);
        let cfg = CfgBuilder::build(&max_method(&asm)).unwrap();

        assert_eq!(cfg.block_count(), 3);
        assert_eq!(cfg.entry(), NodeId::new(0));
        assert_eq!(
            cfg.edge_between(NodeId::new(0), NodeId::new(2)),
            Some(&CfgEdge::ConditionalTrue)
        );
        assert_eq!(
            cfg.edge_between(NodeId::new(0), NodeId::new(1)),
            Some(&CfgEdge::ConditionalFalse)
        );
        assert_eq!(cfg.exits(), &[NodeId::new(1), NodeId::new(2)]);
    }

    #[test]
    fn test_branch_past_end_is_decode_error() {
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 1).goto("end").return_void().label("end");
        let method = asm.build_method("a.B", "f", "()V", true, 1).unwrap();
        match CfgBuilder::build(&method) {
            Err(Error::Decode { offset, .. }) => assert_eq!(offset, 1),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_fall_off_end_is_decode_error() {
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 1);
        let method = asm.build_method("a.B", "f", "()V", true, 1).unwrap();
        assert!(matches!(
            CfgBuilder::build(&method),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_unpaired_move_result() {
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 1).move_result(0).return_void();
        let method = asm.build_method("a.B", "f", "()V", true, 1).unwrap();
        assert!(matches!(
            CfgBuilder::build(&method),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_unreachable_blocks_pruned() {
        let mut asm = CodeAssembler::new();
        asm.goto("end")
            .const_int(0, 1)
            .return_value(0)
            .label("end")
            .return_void();
        let method = asm.build_method("a.B", "f", "()V", true, 1).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        assert_eq!(cfg.block_count(), 2);
        for block in cfg.block_ids() {
            for succ in cfg.successors(block) {
                assert!(succ.index() < cfg.block_count());
            }
        }
    }

    #[test]
    fn test_switch_edges_merged() {
        let mut asm = CodeAssembler::new();
        asm.switch(0, &[(1, "a"), (2, "a"), (3, "b")])
            .return_void()
            .label("a")
            .return_void()
            .label("b")
            .return_void();
        let method = asm.build_method("a.B", "f", "(I)V", true, 1).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();

        let edges: Vec<_> = cfg.outgoing(cfg.entry()).collect();
        assert_eq!(edges.len(), 3);
        assert_eq!(
            edges[0].1,
            &CfgEdge::Switch {
                cases: vec![1, 2],
                default: false
            }
        );
        assert_eq!(
            edges[2].1,
            &CfgEdge::Switch {
                cases: vec![],
                default: true
            }
        );
    }

    #[test]
    fn test_exception_edges_per_throwing_instruction() {
        let call = MethodRef::new("a.B", "work", "()I").unwrap();
        let mut asm = CodeAssembler::new();
        asm.label("try")
            .const_int(0, 0)
            .invoke(InvokeKind::Static, call.clone(), &[])
            .move_result(0)
            .invoke(InvokeKind::Static, call, &[])
            .move_result(1)
            .label("end")
            .return_value(0)
            .label("handler")
            .move_exception(1)
            .return_value(0)
            .try_range("try", "end", "handler", Some("java.lang.Exception"));
        let method = asm.build_method("a.B", "f", "()I", true, 2).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();

        // [const, invoke, move-result] [invoke, move-result] [return] [handler]
        assert_eq!(cfg.block_count(), 4);
        let handler = NodeId::new(3);
        let exceptional: Vec<_> = cfg
            .predecessors(handler)
            .filter(|&pred| cfg.edge_between(pred, handler).is_some_and(CfgEdge::is_exceptional))
            .collect();
        assert_eq!(exceptional, vec![NodeId::new(0), NodeId::new(1)]);
        let first = cfg.block(NodeId::new(0)).unwrap();
        assert_eq!(first.throw_point, Some(1));
        assert_eq!(first.protection.len(), 1);
        assert_eq!(first.protection[0].handler, handler);
        assert!(!first.protection[0].catch_all);
    }

    #[test]
    fn test_misplaced_move_exception() {
        let mut asm = CodeAssembler::new();
        asm.move_exception(0).return_void();
        let method = asm.build_method("a.B", "f", "()V", true, 1).unwrap();
        assert!(matches!(
            CfgBuilder::build(&method),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_conditional_to_fallthrough_is_unconditional() {
        let mut asm = CodeAssembler::new();
        asm.if_zero(IfCondition::Eq, 0, "next")
            .label("next")
            .return_void();
        let method = asm.build_method("a.B", "f", "(I)V", true, 1).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        assert_eq!(
            cfg.edge_between(NodeId::new(0), NodeId::new(1)),
            Some(&CfgEdge::Unconditional)
        );
    }

    #[test]
    fn test_entry_branch_target_gets_empty_entry() {
        // do { v0 += 1 } while (v0 != 0)
        let mut asm = CodeAssembler::new();
        asm.label("top")
            .binary_lit(crate::bytecode::BinaryOp::Add, 0, 0, 1)
            .if_zero(IfCondition::Ne, 0, "top")
            .return_void();
        let method = asm.build_method("a.B", "spin", "(I)V", true, 1).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();

        let entry = cfg.block(cfg.entry()).unwrap();
        assert!(entry.is_empty());
        assert_eq!(cfg.predecessors(cfg.entry()).count(), 0);
        assert_eq!(cfg.successors(cfg.entry()).collect::<Vec<_>>(), vec![NodeId::new(1)]);
        assert_eq!(cfg.predecessors(NodeId::new(1)).count(), 2);
    }
}
