//! The structured region tree.

use std::fmt;

use strum::Display;

use crate::{types::TypeRef, utils::graph::NodeId};

/// How a folded loop tests for termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum LoopKind {
    /// `while (cond) { body }`: the header's first action is the exit test
    While,
    /// `do { body } while (cond)`: the sole back edge is conditional
    DoWhile,
    /// `while (true) { body }`, left only through `break`, `return` or `throw`
    Endless,
}

/// A branch decision of a region, read from the terminator of one CFG block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchCondition {
    /// Block whose `if-*` terminator is tested
    pub block: NodeId,
    /// `true` if the region proceeds when the instruction's condition does *not* hold
    pub negated: bool,
}

impl BranchCondition {
    /// Returns the same test with the opposite sense.
    #[must_use]
    pub fn negate(self) -> Self {
        BranchCondition {
            block: self.block,
            negated: !self.negated,
        }
    }
}

/// One `case` group of a switch region.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// Case keys; several keys share one body
    pub keys: Vec<i32>,
    /// `true` if the default label is attached to this body
    pub default: bool,
    /// Case body; empty when the case jumps straight to the follow
    pub body: Region,
    /// `true` if control continues into the next case instead of leaving the switch
    pub falls_through: bool,
}

/// One `catch` clause of a try region.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    /// Handler entry block
    pub handler: NodeId,
    /// Caught classes, in handler-table order
    pub catch_types: Vec<TypeRef>,
    /// `true` if the clause also catches everything else
    pub catch_all: bool,
    /// Handler body
    pub body: Region,
}

/// Where an explicit jump of a goto region leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpTarget {
    /// The labelled entry starting at this block
    Label(NodeId),
    /// Leaves the loop with this header
    Break(NodeId),
    /// Restarts the loop with this header
    Continue(NodeId),
}

/// When an explicit jump of a goto region is taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JumpCondition {
    /// Always
    Always,
    /// When the `if-*` of `block` evaluates to `taken`
    Branch {
        /// Branching block
        block: NodeId,
        /// Outcome that selects this jump
        taken: bool,
    },
    /// When the switch of `block` selects one of `keys` (or the default)
    Case {
        /// Switching block
        block: NodeId,
        /// Selecting keys
        keys: Vec<i32>,
        /// `true` for the default path
        default: bool,
    },
    /// When an instruction of the entry throws into this handler
    Exception,
}

/// One explicit jump of a goto entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Jump {
    /// Destination
    pub target: JumpTarget,
    /// Selection condition
    pub condition: JumpCondition,
}

/// A labelled entry of a goto fallback region.
#[derive(Debug, Clone, PartialEq)]
pub struct GotoEntry {
    /// Label, the entry's first block
    pub label: NodeId,
    /// Structured body of the entry
    pub body: Region,
    /// Explicit jumps leaving the body, in branch order
    pub jumps: Vec<Jump>,
}

/// A node of the structured control tree.
///
/// Every CFG block of a method appears exactly once as a [`Region::Block`] leaf. The tree
/// owns its children; loops are nodes rather than cycles, and jumps that leave or restart
/// a loop are [`Region::Break`] and [`Region::Continue`] leaves naming the loop header.
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    /// A CFG block, its instructions emitted in order
    Block(NodeId),
    /// Regions executed one after the other
    Sequence(Vec<Region>),
    /// Two-way branch
    If {
        /// Region computing the condition; ends with the branching block
        head: Box<Region>,
        /// The tested condition, in the sense that selects `then_region`
        condition: BranchCondition,
        /// Arm taken when the condition holds
        then_region: Box<Region>,
        /// Arm taken otherwise
        else_region: Option<Box<Region>>,
    },
    /// Natural loop
    Loop {
        /// Refined loop shape
        kind: LoopKind,
        /// Header block, also the loop's label
        header: NodeId,
        /// Header region for `While` loops, tested before each iteration
        head: Option<Box<Region>>,
        /// Continuation test for `While` and `DoWhile` loops
        condition: Option<BranchCondition>,
        /// Loop body
        body: Box<Region>,
    },
    /// Multi-way branch
    Switch {
        /// Region computing the selector; ends with the switching block
        head: Box<Region>,
        /// Block whose switch terminator is tested
        block: NodeId,
        /// Case groups in layout order
        cases: Vec<SwitchCase>,
    },
    /// Protected region with its handlers
    TryCatch {
        /// Protected body
        body: Box<Region>,
        /// Catch clauses in priority order
        catches: Vec<CatchClause>,
        /// Merged `finally` body
        finally: Option<Box<Region>>,
    },
    /// Leaves the loop with the given header
    Break(NodeId),
    /// Restarts the loop with the given header
    Continue(NodeId),
    /// Unstructured fallback: labelled entries connected by explicit jumps
    Goto(Vec<GotoEntry>),
}

impl Region {
    /// Returns an empty sequence.
    #[must_use]
    pub fn empty() -> Self {
        Region::Sequence(Vec::new())
    }

    /// Returns `true` for an empty sequence.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Region::Sequence(items) if items.is_empty())
    }

    /// Wraps `self` in a sequence unless it already is one.
    #[must_use]
    pub fn into_sequence(self) -> Self {
        match self {
            Region::Sequence(_) => self,
            other => Region::Sequence(vec![other]),
        }
    }

    /// Concatenates regions, flattening nested sequences.
    #[must_use]
    pub fn sequence(parts: impl IntoIterator<Item = Region>) -> Self {
        let mut items = Vec::new();
        for part in parts {
            match part {
                Region::Sequence(inner) => items.extend(inner),
                other => items.push(other),
            }
        }
        Region::Sequence(items)
    }

    /// Returns the CFG blocks of every leaf, in tree order.
    #[must_use]
    pub fn blocks(&self) -> Vec<NodeId> {
        let mut blocks = Vec::new();
        self.visit(&mut |region| {
            if let Region::Block(block) = region {
                blocks.push(*block);
            }
        });
        blocks
    }

    /// Returns the number of leaf blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |region| {
            if matches!(region, Region::Block(_)) {
                count += 1;
            }
        });
        count
    }

    /// Returns `true` if any node of the tree is a goto fallback.
    #[must_use]
    pub fn has_goto(&self) -> bool {
        let mut found = false;
        self.visit(&mut |region| found |= matches!(region, Region::Goto(_)));
        found
    }

    /// Returns the last leaf block in execution order.
    #[must_use]
    pub fn last_block(&self) -> Option<NodeId> {
        match self {
            Region::Block(block) => Some(*block),
            Region::Sequence(items) => items.iter().rev().find_map(Region::last_block),
            _ => None,
        }
    }

    /// Calls `f` on every node in pre-order.
    pub fn visit(&self, f: &mut impl FnMut(&Region)) {
        f(self);
        match self {
            Region::Block(_) | Region::Break(_) | Region::Continue(_) => {}
            Region::Sequence(items) => items.iter().for_each(|item| item.visit(f)),
            Region::If {
                head,
                then_region,
                else_region,
                ..
            } => {
                head.visit(f);
                then_region.visit(f);
                if let Some(else_region) = else_region {
                    else_region.visit(f);
                }
            }
            Region::Loop { head, body, .. } => {
                if let Some(head) = head {
                    head.visit(f);
                }
                body.visit(f);
            }
            Region::Switch { head, cases, .. } => {
                head.visit(f);
                cases.iter().for_each(|case| case.body.visit(f));
            }
            Region::TryCatch {
                body,
                catches,
                finally,
            } => {
                body.visit(f);
                catches.iter().for_each(|clause| clause.body.visit(f));
                if let Some(finally) = finally {
                    finally.visit(f);
                }
            }
            Region::Goto(entries) => entries.iter().for_each(|entry| entry.body.visit(f)),
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            Region::Block(block) => writeln!(f, "{pad}{block}"),
            Region::Break(header) => writeln!(f, "{pad}break {header}"),
            Region::Continue(header) => writeln!(f, "{pad}continue {header}"),
            Region::Sequence(items) => {
                writeln!(f, "{pad}sequence")?;
                items.iter().try_for_each(|item| item.write_tree(f, depth + 1))
            }
            Region::If {
                head,
                condition,
                then_region,
                else_region,
            } => {
                let sense = if condition.negated { "!" } else { "" };
                writeln!(f, "{pad}if {sense}{}", condition.block)?;
                head.write_tree(f, depth + 1)?;
                then_region.write_tree(f, depth + 1)?;
                if let Some(else_region) = else_region {
                    writeln!(f, "{pad}else")?;
                    else_region.write_tree(f, depth + 1)?;
                }
                Ok(())
            }
            Region::Loop {
                kind,
                header,
                head,
                body,
                ..
            } => {
                writeln!(f, "{pad}{kind} {header}")?;
                if let Some(head) = head {
                    head.write_tree(f, depth + 1)?;
                }
                body.write_tree(f, depth + 1)
            }
            Region::Switch {
                head, block, cases, ..
            } => {
                writeln!(f, "{pad}switch {block}")?;
                head.write_tree(f, depth + 1)?;
                for case in cases {
                    writeln!(f, "{pad}case {:?}{}", case.keys, if case.default { " default" } else { "" })?;
                    case.body.write_tree(f, depth + 1)?;
                }
                Ok(())
            }
            Region::TryCatch {
                body,
                catches,
                finally,
            } => {
                writeln!(f, "{pad}try")?;
                body.write_tree(f, depth + 1)?;
                for clause in catches {
                    writeln!(f, "{pad}catch {}", clause.handler)?;
                    clause.body.write_tree(f, depth + 1)?;
                }
                if let Some(finally) = finally {
                    writeln!(f, "{pad}finally")?;
                    finally.write_tree(f, depth + 1)?;
                }
                Ok(())
            }
            Region::Goto(entries) => {
                writeln!(f, "{pad}goto")?;
                for entry in entries {
                    writeln!(f, "{pad}{}:", entry.label)?;
                    entry.body.write_tree(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_flattens_and_counts_leaves() {
        let inner = Region::Sequence(vec![Region::Block(NodeId::new(1)), Region::Block(NodeId::new(2))]);
        let region = Region::sequence([Region::Block(NodeId::new(0)), inner, Region::Break(NodeId::new(0))]);
        let Region::Sequence(items) = &region else {
            panic!("expected a sequence");
        };
        assert_eq!(items.len(), 4);
        assert_eq!(region.block_count(), 3);
        assert_eq!(
            region.blocks(),
            vec![NodeId::new(0), NodeId::new(1), NodeId::new(2)]
        );
        assert_eq!(region.last_block(), Some(NodeId::new(2)));
        assert!(!region.has_goto());
    }
}
