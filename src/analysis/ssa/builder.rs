//! SSA construction (Cytron et al.).
//!
//! This module implements the classic SSA construction algorithm from:
//!
//! > Cytron et al., "Efficiently Computing Static Single Assignment Form and the
//! > Control Dependence Graph", ACM TOPLAS 1991
//!
//! # Algorithm Overview
//!
//! 1. **Definition Sites**: Collect, per register, the blocks writing it. Parameters are
//!    written by the entry block.
//! 2. **Phi Placement**: Insert phis at the iterated dominance frontier of each
//!    register's definition sites, pruned to blocks where the register is live-in.
//! 3. **Renaming**: Walk the dominator tree in pre-order with an explicit work stack,
//!    keeping one version stack per register.
//!
//! Reads no definition reaches resolve to one `Undefined` value per register instead of
//! failing, since bytecode from the wild is not always verifiable.

use std::collections::BTreeSet;

use tracing::debug;

use crate::{
    analysis::{
        cfg::ControlFlowGraph,
        liveness::RegisterLiveness,
        ssa::{
            PhiNode, PhiOperand, SsaBlock, SsaFunction, SsaInstruction, SsaValue, SsaValueId,
            UseSite, ValueOrigin,
        },
    },
    bytecode::{MethodCode, Opcode, Register},
    utils::graph::NodeId,
    Error, Result,
};

/// Work item of the renaming walk.
enum Walk {
    Enter(NodeId),
    Exit(Vec<Register>),
}

/// Builder for constructing SSA form from a control flow graph.
pub struct SsaBuilder<'a> {
    cfg: &'a ControlFlowGraph,
    method: &'a MethodCode,
    liveness: &'a RegisterLiveness,
    blocks: Vec<SsaBlock>,
    values: Vec<SsaValue>,
    /// Operand slots per block and phi, in predecessor order, filled while renaming
    pending: Vec<Vec<Vec<Option<SsaValueId>>>>,
    stacks: Vec<Vec<SsaValueId>>,
    undefined: Vec<Option<SsaValueId>>,
}

impl<'a> SsaBuilder<'a> {
    /// Builds the SSA form of `method` over its CFG.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ssa`] if an operand refers to a register outside the frame or a
    /// phi ends up without an operand for one of its predecessors.
    pub fn build(
        cfg: &'a ControlFlowGraph,
        method: &'a MethodCode,
        liveness: &'a RegisterLiveness,
    ) -> Result<SsaFunction> {
        let registers = usize::from(method.registers);
        let mut builder = SsaBuilder {
            cfg,
            method,
            liveness,
            blocks: vec![SsaBlock::default(); cfg.block_count()],
            values: Vec::new(),
            pending: vec![Vec::new(); cfg.block_count()],
            stacks: vec![Vec::new(); registers],
            undefined: vec![None; registers],
        };

        builder.place_phis()?;
        let params = builder.seed_parameters();
        builder.rename()?;
        builder.finish_phis()?;

        let function = SsaFunction {
            blocks: builder.blocks,
            values: builder.values,
            params,
        };
        debug!(
            method = %method.name,
            values = function.value_count(),
            phis = function.phi_count(),
            "built SSA form"
        );
        Ok(function)
    }

    fn place_phis(&mut self) -> Result<()> {
        let registers = usize::from(self.method.registers);
        let mut def_blocks: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); registers];
        for (register, _) in self.method.parameter_registers() {
            def_blocks[usize::from(register)].insert(self.cfg.entry());
        }
        for block in self.cfg.block_ids() {
            for insn in self.cfg.instructions(block) {
                if let Some(register) = insn.opcode.def() {
                    let Some(sites) = def_blocks.get_mut(usize::from(register)) else {
                        return Err(Error::Ssa(format!(
                            "register v{register} outside frame at {:#06x}",
                            insn.offset
                        )));
                    };
                    sites.insert(block);
                }
            }
        }

        let forced = self.throw_point_joins(registers);
        let cfg = self.cfg;
        let frontiers = cfg.dominance_frontiers();
        for (index, sites) in def_blocks.iter().enumerate() {
            let Ok(register) = Register::try_from(index) else {
                continue;
            };
            let mut placed: BTreeSet<NodeId> = BTreeSet::new();
            let mut worklist: Vec<NodeId> = sites.iter().copied().collect();
            for &join in &forced[index] {
                if self.place_phi(join, register, &mut placed) && !sites.contains(&join) {
                    worklist.push(join);
                }
            }
            while let Some(block) = worklist.pop() {
                let Some(frontier) = frontiers.get(block.index()) else {
                    continue;
                };
                for &join in frontier {
                    if self.place_phi(join, register, &mut placed) && !sites.contains(&join) {
                        worklist.push(join);
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns, per register, the handler blocks that must merge it because a protected
    /// predecessor writes it at or after its throw point.
    ///
    /// A handler dominated by such a block would otherwise inherit the value from the end
    /// of the block instead of the one current when the exception was raised.
    fn throw_point_joins(&self, registers: usize) -> Vec<BTreeSet<NodeId>> {
        let mut forced: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); registers];
        let insns = self.cfg.all_instructions();
        for (block, data) in self.cfg.blocks() {
            let Some(throw_point) = data.throw_point else {
                continue;
            };
            let handlers: Vec<NodeId> = self
                .cfg
                .outgoing(block)
                .filter(|(_, edge)| edge.is_exceptional())
                .map(|(target, _)| target)
                .collect();
            for insn in insns.get(throw_point..data.range.end).unwrap_or_default() {
                let Some(register) = insn.opcode.def() else {
                    continue;
                };
                if let Some(joins) = forced.get_mut(usize::from(register)) {
                    joins.extend(handlers.iter().copied());
                }
            }
        }
        forced
    }

    /// Places a phi for `register` at `join` unless one exists or the register is dead
    /// there. Returns `true` if a phi was added.
    fn place_phi(
        &mut self,
        join: NodeId,
        register: Register,
        placed: &mut BTreeSet<NodeId>,
    ) -> bool {
        if placed.contains(&join) || !self.liveness.is_live_in(join, register) {
            return false;
        }
        placed.insert(join);
        let arity = self.cfg.predecessors(join).count();
        // The result is assigned during renaming.
        self.blocks[join.index()]
            .phis
            .push(PhiNode::new(SsaValueId::new(usize::MAX), register));
        self.pending[join.index()].push(vec![None; arity]);
        true
    }

    fn seed_parameters(&mut self) -> Vec<SsaValueId> {
        self.method
            .parameter_registers()
            .into_iter()
            .enumerate()
            .map(|(index, (register, _))| {
                let id = self.new_value(register, ValueOrigin::Parameter { index });
                self.stacks[usize::from(register)].push(id);
                id
            })
            .collect()
    }

    fn new_value(&mut self, register: Register, origin: ValueOrigin) -> SsaValueId {
        let id = SsaValueId::new(self.values.len());
        self.values.push(SsaValue::new(id, register, origin));
        id
    }

    /// Returns the reaching definition of `register`, creating its undefined value on
    /// first need.
    fn current(&mut self, register: Register) -> Result<SsaValueId> {
        let slot = usize::from(register);
        if let Some(&top) = self.stacks.get(slot).and_then(|stack| stack.last()) {
            return Ok(top);
        }
        match self.undefined.get(slot) {
            Some(Some(id)) => Ok(*id),
            Some(None) => {
                let id = self.new_value(register, ValueOrigin::Undefined);
                self.undefined[slot] = Some(id);
                Ok(id)
            }
            None => Err(Error::Ssa(format!("register v{register} outside frame"))),
        }
    }

    fn define(
        &mut self,
        register: Register,
        origin: ValueOrigin,
        pushed: &mut Vec<Register>,
    ) -> SsaValueId {
        let id = self.new_value(register, origin);
        self.stacks[usize::from(register)].push(id);
        pushed.push(register);
        id
    }

    fn rename(&mut self) -> Result<()> {
        let mut work = vec![Walk::Enter(self.cfg.entry())];
        while let Some(item) = work.pop() {
            match item {
                Walk::Enter(block) => {
                    let pushed = self.rename_block(block)?;
                    work.push(Walk::Exit(pushed));
                    let children = self.cfg.dominators().children(block);
                    work.extend(children.iter().rev().map(|&child| Walk::Enter(child)));
                }
                Walk::Exit(pushed) => {
                    for register in pushed {
                        self.stacks[usize::from(register)].pop();
                    }
                }
            }
        }
        Ok(())
    }

    fn rename_block(&mut self, block: NodeId) -> Result<Vec<Register>> {
        let mut pushed = Vec::new();
        let cfg = self.cfg;
        let Some(data) = cfg.block(block) else {
            return Err(Error::Ssa(format!("unknown block {block}")));
        };

        for phi in 0..self.blocks[block.index()].phis.len() {
            let register = self.blocks[block.index()].phis[phi].register();
            let id = self.define(register, ValueOrigin::Phi { block, phi }, &mut pushed);
            self.blocks[block.index()].phis[phi] = PhiNode::new(id, register);
        }

        let insns = cfg.all_instructions();
        let mut folded_next = false;
        for index in data.range.clone() {
            if data.throw_point == Some(index) {
                self.fill_successors(block, true)?;
            }
            let opcode = &insns[index].opcode;
            if std::mem::take(&mut folded_next) {
                self.blocks[block.index()].instructions.push(SsaInstruction {
                    index,
                    uses: Vec::new(),
                    def: None,
                    folded: true,
                });
                continue;
            }

            let mut uses = Vec::new();
            for (operand, register) in opcode.uses().into_iter().enumerate() {
                let value = self.current(register)?;
                self.values[value.index()].add_use(UseSite::Instruction {
                    block,
                    index,
                    operand,
                });
                uses.push(value);
            }

            let origin = ValueOrigin::Instruction { block, index };
            let def = match (opcode, insns.get(index + 1)) {
                (Opcode::Invoke { .. }, Some(next)) if index + 1 < data.range.end => {
                    match next.opcode {
                        Opcode::MoveResult { dst } => {
                            folded_next = true;
                            Some(self.define(dst, origin, &mut pushed))
                        }
                        _ => None,
                    }
                }
                _ => opcode
                    .def()
                    .map(|register| self.define(register, origin, &mut pushed)),
            };

            self.blocks[block.index()].instructions.push(SsaInstruction {
                index,
                uses,
                def,
                folded: false,
            });
        }

        self.fill_successors(block, false)?;
        Ok(pushed)
    }

    /// Fills the operands `block` contributes to the phis of its normal successors, or of
    /// its exceptional successors when `exceptional` is set.
    fn fill_successors(&mut self, block: NodeId, exceptional: bool) -> Result<()> {
        let cfg = self.cfg;
        let has_throw_point = cfg.block(block).is_some_and(|data| data.throw_point.is_some());
        for (succ, edge) in cfg.outgoing(block) {
            // Exception edges of blocks without a throw point behave like normal edges.
            let at_throw_point = edge.is_exceptional() && has_throw_point;
            if at_throw_point != exceptional {
                continue;
            }
            let Some(slot) = cfg.predecessors(succ).position(|pred| pred == block) else {
                return Err(Error::Ssa(format!("{block} missing from predecessors of {succ}")));
            };
            for phi in 0..self.blocks[succ.index()].phis.len() {
                let register = self.blocks[succ.index()].phis[phi].register();
                let value = self.current(register)?;
                if let Some(operands) = self.pending[succ.index()].get_mut(phi) {
                    if let Some(operand) = operands.get_mut(slot) {
                        *operand = Some(value);
                    }
                }
            }
        }
        Ok(())
    }

    fn finish_phis(&mut self) -> Result<()> {
        let cfg = self.cfg;
        for block in cfg.block_ids() {
            let preds: Vec<NodeId> = cfg.predecessors(block).collect();
            let pending = std::mem::take(&mut self.pending[block.index()]);
            for (phi, operands) in pending.into_iter().enumerate() {
                for (operand, (value, &predecessor)) in operands.iter().zip(&preds).enumerate() {
                    let Some(value) = *value else {
                        return Err(Error::Ssa(format!(
                            "phi {phi} of {block} has no operand from {predecessor}"
                        )));
                    };
                    self.values[value.index()].add_use(UseSite::Phi {
                        block,
                        phi,
                        operand,
                    });
                    self.blocks[block.index()].phis[phi].add_operand(PhiOperand {
                        value,
                        predecessor,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::cfg::CfgBuilder,
        bytecode::{BinaryOp, CodeAssembler, IfCondition, InvokeKind, MethodRef},
    };

    fn build(method: &MethodCode) -> (ControlFlowGraph, SsaFunction) {
        let cfg = CfgBuilder::build(method).unwrap();
        let liveness = RegisterLiveness::compute(&cfg, method.registers);
        let ssa = SsaBuilder::build(&cfg, method, &liveness).unwrap();
        (cfg, ssa)
    }

    fn assert_well_formed(cfg: &ControlFlowGraph, ssa: &SsaFunction) {
        for (block, phi) in ssa.phis() {
            assert_eq!(phi.operands().len(), cfg.predecessors(block).count());
        }
        for value in ssa.values() {
            for site in value.uses() {
                if let UseSite::Instruction { block, index, operand } = *site {
                    let insn = ssa.instruction(block, index).unwrap();
                    assert_eq!(insn.uses[operand], value.id());
                }
            }
        }
    }

    #[test]
    fn test_loop_phi() {
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 0)
            .label("head")
            .if_cmp(IfCondition::Ge, 0, 1, "done")
            .binary_lit(BinaryOp::Add, 0, 0, 1)
            .goto("head")
            .label("done")
            .return_value(0);
        let method = asm.build_method("a.B", "count", "(I)I", true, 2).unwrap();
        let (cfg, ssa) = build(&method);
        assert_well_formed(&cfg, &ssa);

        // Only v0 is redefined in the loop, and v1 never needs a merge.
        assert_eq!(ssa.phi_count(), 1);
        let head = NodeId::new(1);
        let phi = &ssa.block(head).unwrap().phis[0];
        assert_eq!(phi.register(), 0);
        let init = ssa.instruction(NodeId::new(0), 0).unwrap().def.unwrap();
        let step = ssa.instruction(NodeId::new(2), 2).unwrap().def.unwrap();
        assert_eq!(phi.operand_from(NodeId::new(0)), Some(init));
        assert_eq!(phi.operand_from(NodeId::new(2)), Some(step));

        // The comparison and the return both read the phi.
        let test = ssa.instruction(head, 1).unwrap();
        assert_eq!(test.uses[0], phi.result());
        assert_eq!(test.uses[1], ssa.params()[0]);
        let ret = ssa.instruction(NodeId::new(3), 4).unwrap();
        assert_eq!(ret.uses, vec![phi.result()]);
    }

    #[test]
    fn test_undefined_read_synthesizes_value() {
        let mut asm = CodeAssembler::new();
        asm.return_value(0);
        let method = asm.build_method("a.B", "f", "()I", true, 1).unwrap();
        let (_, ssa) = build(&method);
        let ret = ssa.instruction(NodeId::new(0), 0).unwrap();
        assert!(ssa.value(ret.uses[0]).unwrap().is_undefined());
    }

    #[test]
    fn test_invoke_owns_move_result() {
        let call = MethodRef::new("a.B", "next", "()I").unwrap();
        let mut asm = CodeAssembler::new();
        asm.invoke(InvokeKind::Static, call, &[])
            .move_result(0)
            .return_value(0);
        let method = asm.build_method("a.B", "f", "()I", true, 1).unwrap();
        let (_, ssa) = build(&method);
        let entry = ssa.block(NodeId::new(0)).unwrap();
        let invoke = &entry.instructions[0];
        assert!(entry.instructions[1].folded);
        assert_eq!(entry.instructions[2].uses, vec![invoke.def.unwrap()]);
        assert_eq!(
            ssa.value(invoke.def.unwrap()).unwrap().origin(),
            ValueOrigin::Instruction {
                block: NodeId::new(0),
                index: 0
            }
        );
    }

    #[test]
    fn test_handler_phi_sees_value_before_throw_point() {
        let call = MethodRef::new("a.B", "work", "()I").unwrap();
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 7)
            .label("try")
            .invoke(InvokeKind::Static, call, &[])
            .move_result(0)
            .label("end")
            .return_value(0)
            .label("handler")
            .move_exception(1)
            .return_value(0)
            .try_range("try", "end", "handler", None);
        let method = asm.build_method("a.B", "f", "()I", true, 2).unwrap();
        let (cfg, ssa) = build(&method);
        assert_well_formed(&cfg, &ssa);

        // The handler merges v0 as it was before the invoke overwrote it.
        let handler = NodeId::new(3);
        let phi = &ssa.block(handler).unwrap().phis[0];
        assert_eq!(phi.register(), 0);
        let seven = ssa.instruction(NodeId::new(0), 0).unwrap().def.unwrap();
        assert_eq!(phi.operand_from(NodeId::new(1)), Some(seven));
        let read = ssa.instruction(handler, 5).unwrap().uses[0];
        assert_eq!(read, phi.result());
    }

    #[test]
    fn test_phi_arity_matches_predecessors_at_entry_loop() {
        let mut asm = CodeAssembler::new();
        asm.label("top")
            .binary_lit(BinaryOp::Add, 0, 0, 1)
            .if_zero(IfCondition::Ne, 0, "top")
            .return_value(0);
        let method = asm.build_method("a.B", "spin", "(I)I", true, 1).unwrap();
        let (cfg, ssa) = build(&method);
        assert_well_formed(&cfg, &ssa);
        let phi = &ssa.block(NodeId::new(1)).unwrap().phis[0];
        assert_eq!(phi.operand_from(NodeId::new(0)), Some(ssa.params()[0]));
    }
}
