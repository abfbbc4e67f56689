//! The SSA form of one method.

use std::fmt;

use crate::{
    analysis::ssa::{PhiNode, SsaValue, SsaValueId},
    utils::graph::NodeId,
};

/// SSA view of one bytecode instruction.
///
/// `uses[i]` is the value read for `Opcode::uses()[i]`. Invokes carry the result of their
/// paired `move-result`, which is then marked `folded` and reads and writes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaInstruction {
    /// Absolute instruction index
    pub index: usize,
    /// Values read, in operand order
    pub uses: Vec<SsaValueId>,
    /// Value written
    pub def: Option<SsaValueId>,
    /// `true` for a `move-result` whose value is owned by its invoke
    pub folded: bool,
}

/// Phis and instructions of one block.
#[derive(Debug, Clone, Default)]
pub struct SsaBlock {
    /// Merge placeholders at the block entry
    pub phis: Vec<PhiNode>,
    /// One entry per instruction of the block, in order
    pub instructions: Vec<SsaInstruction>,
}

impl SsaBlock {
    /// Returns the SSA instruction for absolute index `index`.
    #[must_use]
    pub fn instruction(&self, index: usize) -> Option<&SsaInstruction> {
        let first = self.instructions.first()?.index;
        self.instructions.get(index.checked_sub(first)?)
    }
}

/// A method in SSA form: per-block phis and renamed operands plus the value table.
#[derive(Debug, Clone)]
pub struct SsaFunction {
    pub(crate) blocks: Vec<SsaBlock>,
    pub(crate) values: Vec<SsaValue>,
    pub(crate) params: Vec<SsaValueId>,
}

impl SsaFunction {
    /// Returns the SSA block for a CFG block.
    #[must_use]
    pub fn block(&self, id: NodeId) -> Option<&SsaBlock> {
        self.blocks.get(id.index())
    }

    /// Returns all blocks, indexed like the CFG.
    #[must_use]
    pub fn blocks(&self) -> &[SsaBlock] {
        &self.blocks
    }

    /// Returns a value by id.
    #[must_use]
    pub fn value(&self, id: SsaValueId) -> Option<&SsaValue> {
        self.values.get(id.index())
    }

    /// Returns the value table.
    #[must_use]
    pub fn values(&self) -> &[SsaValue] {
        &self.values
    }

    /// Returns the number of values.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Returns the parameter values, receiver first.
    #[must_use]
    pub fn params(&self) -> &[SsaValueId] {
        &self.params
    }

    /// Returns the SSA instruction at absolute index `index` of `block`.
    #[must_use]
    pub fn instruction(&self, block: NodeId, index: usize) -> Option<&SsaInstruction> {
        self.block(block)?.instruction(index)
    }

    /// Returns the phi defining `value`, if it is one.
    #[must_use]
    pub fn phi(&self, value: SsaValueId) -> Option<&PhiNode> {
        match self.value(value)?.origin() {
            crate::analysis::ssa::ValueOrigin::Phi { block, phi } => {
                self.block(block)?.phis.get(phi)
            }
            _ => None,
        }
    }

    /// Iterates over every phi with its block.
    pub fn phis(&self) -> impl Iterator<Item = (NodeId, &PhiNode)> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(block, data)| data.phis.iter().map(move |phi| (NodeId::new(block), phi)))
    }

    /// Returns the total number of phis.
    #[must_use]
    pub fn phi_count(&self) -> usize {
        self.blocks.iter().map(|block| block.phis.len()).sum()
    }
}

impl fmt::Display for SsaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (block, data) in self.blocks.iter().enumerate() {
            writeln!(f, "B{block}:")?;
            for phi in &data.phis {
                let operands: Vec<String> = phi
                    .operands()
                    .iter()
                    .map(|operand| format!("{}:{}", operand.predecessor, operand.value))
                    .collect();
                writeln!(f, "  {} = phi({})", phi.result(), operands.join(", "))?;
            }
            for insn in &data.instructions {
                if insn.folded {
                    continue;
                }
                let uses: Vec<String> = insn.uses.iter().map(ToString::to_string).collect();
                match insn.def {
                    Some(def) => writeln!(f, "  {def} = #{}({})", insn.index, uses.join(", "))?,
                    None => writeln!(f, "  #{}({})", insn.index, uses.join(", "))?,
                }
            }
        }
        Ok(())
    }
}
