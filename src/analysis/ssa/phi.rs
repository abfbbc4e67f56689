//! Merge placeholders.

use crate::{analysis::ssa::SsaValueId, bytecode::Register, utils::graph::NodeId};

/// One incoming definition of a phi.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiOperand {
    /// Value flowing in
    pub value: SsaValueId,
    /// Predecessor block the value arrives from
    pub predecessor: NodeId,
}

/// A merge placeholder at the entry of a join block.
///
/// Operands are ordered like the block's predecessors in the CFG, so the operand count
/// always equals the predecessor count.
///
/// For a handler entry, the operand from a protected predecessor is the definition
/// reaching that predecessor's throw point, not its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiNode {
    result: SsaValueId,
    register: Register,
    operands: Vec<PhiOperand>,
}

impl PhiNode {
    /// Creates a phi with no operands.
    #[must_use]
    pub fn new(result: SsaValueId, register: Register) -> Self {
        PhiNode {
            result,
            register,
            operands: Vec::new(),
        }
    }

    /// Returns the value defined by this phi.
    #[must_use]
    pub const fn result(&self) -> SsaValueId {
        self.result
    }

    /// Returns the register being merged.
    #[must_use]
    pub const fn register(&self) -> Register {
        self.register
    }

    /// Returns the incoming definitions, in predecessor order.
    #[must_use]
    pub fn operands(&self) -> &[PhiOperand] {
        &self.operands
    }

    /// Appends an operand.
    pub fn add_operand(&mut self, operand: PhiOperand) {
        self.operands.push(operand);
    }

    /// Returns the value arriving from `predecessor`.
    #[must_use]
    pub fn operand_from(&self, predecessor: NodeId) -> Option<SsaValueId> {
        self.operands
            .iter()
            .find(|operand| operand.predecessor == predecessor)
            .map(|operand| operand.value)
    }
}
