//! Register liveness.
//!
//! A register is *live* at a program point if some path from that point reads it before
//! writing it. This is the classic backward data flow problem over registers:
//!
//! - `OUT[B]` = ∪{IN[S] | S is a normal successor of B}
//! - `IN[B]` = transfer of `OUT[B]` backwards through the instructions of B
//!
//! Exception edges leave a block at its throw point, before the throwing instruction's own
//! result is written, so the live-in sets of a block's handlers join the running set right
//! before that instruction rather than at the block end.
//!
//! SSA construction uses the live-in sets to prune phi placement, and `finally` merging
//! uses [`RegisterLiveness::is_live_after`] to prove that duplicated cleanup code is dead.

use crate::{
    analysis::cfg::ControlFlowGraph,
    bytecode::Register,
    utils::{graph::NodeId, BitSet},
};

/// Live-in and live-out register sets of every block.
#[derive(Debug, Clone)]
pub struct RegisterLiveness {
    registers: usize,
    live_in: Vec<BitSet>,
    live_out: Vec<BitSet>,
}

impl RegisterLiveness {
    /// Computes liveness for a frame of `registers` registers.
    #[must_use]
    pub fn compute(cfg: &ControlFlowGraph, registers: u16) -> Self {
        let registers = usize::from(registers);
        let count = cfg.block_count();
        let mut liveness = RegisterLiveness {
            registers,
            live_in: vec![BitSet::new(registers); count],
            live_out: vec![BitSet::new(registers); count],
        };

        // Post-order visits successors first, which makes the backward problem converge
        // in few passes.
        let order: Vec<NodeId> = cfg.reverse_postorder().iter().rev().copied().collect();
        let mut changed = true;
        while changed {
            changed = false;
            for &block in &order {
                let out = liveness.normal_out(cfg, block);
                let live_in = liveness.transfer(cfg, block, out.clone(), None);
                liveness.live_out[block.index()] = out;
                if live_in != liveness.live_in[block.index()] {
                    liveness.live_in[block.index()] = live_in;
                    changed = true;
                }
            }
        }

        for block in cfg.block_ids() {
            for succ in cfg.successors(block) {
                let handler_in = liveness.live_in[succ.index()].clone();
                liveness.live_out[block.index()].union_with(&handler_in);
            }
        }
        liveness
    }

    fn normal_out(&self, cfg: &ControlFlowGraph, block: NodeId) -> BitSet {
        let mut out = BitSet::new(self.registers);
        for (succ, edge) in cfg.outgoing(block) {
            if edge.is_normal() {
                out.union_with(&self.live_in[succ.index()]);
            }
        }
        out
    }

    fn exceptional_in(&self, cfg: &ControlFlowGraph, block: NodeId) -> BitSet {
        let mut live = BitSet::new(self.registers);
        for (succ, edge) in cfg.outgoing(block) {
            if edge.is_exceptional() {
                live.union_with(&self.live_in[succ.index()]);
            }
        }
        live
    }

    /// Runs the block transfer backwards from `live` (the set at the block end), stopping
    /// after the instruction at absolute index `stop` if given.
    fn transfer(
        &self,
        cfg: &ControlFlowGraph,
        block: NodeId,
        mut live: BitSet,
        stop: Option<usize>,
    ) -> BitSet {
        let Some(data) = cfg.block(block) else {
            return live;
        };
        let instructions = cfg.all_instructions();
        for index in data.range.clone().rev() {
            if stop.is_some_and(|stop| index <= stop) {
                break;
            }
            let opcode = &instructions[index].opcode;
            if let Some(def) = opcode.def() {
                live.remove(usize::from(def));
            }
            for register in opcode.uses() {
                live.insert(usize::from(register));
            }
            if data.throw_point == Some(index) {
                live.union_with(&self.exceptional_in(cfg, block));
            }
        }
        live
    }

    /// Returns the registers live on entry to `block`.
    #[must_use]
    pub fn live_in(&self, block: NodeId) -> Option<&BitSet> {
        self.live_in.get(block.index())
    }

    /// Returns the registers live on exit from `block`, through any edge.
    #[must_use]
    pub fn live_out(&self, block: NodeId) -> Option<&BitSet> {
        self.live_out.get(block.index())
    }

    /// Returns `true` if `register` is live on entry to `block`.
    #[must_use]
    pub fn is_live_in(&self, block: NodeId, register: Register) -> bool {
        self.live_in(block)
            .is_some_and(|set| set.contains(usize::from(register)))
    }

    /// Returns `true` if `register` is live right after the instruction at absolute index
    /// `index` of `block`.
    #[must_use]
    pub fn is_live_after(
        &self,
        cfg: &ControlFlowGraph,
        block: NodeId,
        index: usize,
        register: Register,
    ) -> bool {
        let out = self.normal_out(cfg, block);
        self.transfer(cfg, block, out, Some(index))
            .contains(usize::from(register))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::cfg::CfgBuilder,
        bytecode::{BinaryOp, CodeAssembler, IfCondition, InvokeKind, MethodRef},
    };

    #[test]
    fn test_loop_liveness() {
        // v0 = 0; loop: if v0 >= v1 goto done; v0 += 1; goto loop; done: return v0
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 0)
            .label("head")
            .if_cmp(IfCondition::Ge, 0, 1, "done")
            .binary_lit(BinaryOp::Add, 0, 0, 1)
            .goto("head")
            .label("done")
            .return_value(0);
        let method = asm.build_method("a.B", "f", "(I)I", true, 2).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        let liveness = RegisterLiveness::compute(&cfg, method.registers);

        let head = NodeId::new(1);
        assert!(liveness.is_live_in(head, 0));
        assert!(liveness.is_live_in(head, 1));
        assert!(!liveness.is_live_in(NodeId::new(0), 0));
        assert!(liveness.is_live_in(NodeId::new(0), 1));
        assert!(!liveness.is_live_in(NodeId::new(3), 1));
    }

    #[test]
    fn test_handler_liveness_joins_at_throw_point() {
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
        let cfg = CfgBuilder::build(&method).unwrap();
        let liveness = RegisterLiveness::compute(&cfg, method.registers);

        // The handler reads v0, and the move-result overwriting it runs after the throw
        // point, so v0 is live into the protected block.
        let protected = NodeId::new(1);
        assert!(liveness.is_live_in(protected, 0));
        assert!(!liveness.is_live_in(NodeId::new(3), 1));
        // After the const in block 0, v0 is live.
        assert!(liveness.is_live_after(&cfg, NodeId::new(0), 0, 0));
    }
}
