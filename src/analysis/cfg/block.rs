//! Basic blocks of the control flow graph.

use std::ops::Range;

use crate::{types::TypeRef, utils::graph::NodeId};

/// One handler a protected block may transfer to, with every catch type leading there.
///
/// Exception table entries sharing a handler block are grouped into one entry, which is how
/// multi-catch clauses appear in bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatchEntry {
    /// Handler entry block
    pub handler: NodeId,
    /// Caught classes, in priority order
    pub catch_types: Vec<TypeRef>,
    /// `true` if a catch-all entry leads to this handler
    pub catch_all: bool,
}

/// A maximal run of instructions with a single entry and a single set of successors.
///
/// Instructions are referenced by index into the method's instruction array, never copied.
/// Only the last instruction may transfer control; inside protected ranges only the last
/// instruction (or the invoke paired with a trailing `move-result`) may throw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Code-unit offset of the first instruction
    pub start: u32,
    /// Indices of the block's instructions
    pub range: Range<usize>,
    /// Handlers covering this block, in priority order
    pub protection: Vec<CatchEntry>,
    /// Index of the instruction whose exceptions leave along the block's exception edges
    pub throw_point: Option<usize>,
}

impl BasicBlock {
    /// Returns the number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Returns `true` if the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Returns `true` if any handler covers this block.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        !self.protection.is_empty()
    }

    /// Returns the index of the last instruction.
    #[must_use]
    pub fn last_index(&self) -> Option<usize> {
        self.range.end.checked_sub(1).filter(|&i| i >= self.range.start)
    }
}
