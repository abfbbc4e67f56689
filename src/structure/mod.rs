//! Control flow structuring.
//!
//! This module turns the control flow graph of a method into a tree of structured
//! [`Region`]s: sequences, `if`/`else`, loops, switches and try/catch/finally. Control flow
//! with no structured equivalent is kept as a [`Region::Goto`] region of labelled entries
//! connected by explicit jumps, so every method produces a tree.
//!
//! # Architecture
//!
//! The [`Structurer`] works on a private region graph whose nodes start as single blocks.
//! Each fold replaces a group of nodes by one node holding the combined region, until a
//! single node is left. Loops are reduced as nested sub-problems in which jumps back to the
//! header and out of the loop are [`Region::Continue`] and [`Region::Break`] leaves.
//!
//! # Key Components
//!
//! - [`Structurer`] - The reduction driver
//! - [`Structure`] - Root region plus the instructions a merged `finally` made redundant
//! - [`Region`] - The structured tree
//!
//! # Guarantees
//!
//! Every CFG block appears exactly once as a [`Region::Block`] leaf of the result, whether
//! structuring succeeded fully or fell back to explicit jumps.

mod conditional;
mod exception;
mod graph;
mod looping;
mod region;
mod structurer;

pub use region::{
    BranchCondition, CatchClause, GotoEntry, Jump, JumpCondition, JumpTarget, LoopKind, Region,
    SwitchCase,
};
pub use structurer::{Structure, Structurer};
