//! Control Flow Graph (CFG) construction and analysis.
//!
//! The CFG builds upon the generic [`crate::utils::graph::DirectedGraph`] infrastructure,
//! providing method-specific node and edge types while leveraging shared algorithms for
//! dominators and traversals.
//!
//! # Key Components
//!
//! - [`CfgBuilder`] - Builds the graph from a method's instructions and exception table
//! - [`ControlFlowGraph`] - The main CFG structure wrapping basic blocks
//! - [`BasicBlock`] / [`CatchEntry`] - Blocks and the handlers protecting them
//! - [`CfgEdge`] - Edge representation with control flow semantics
//! - [`LoopForest`] / [`NaturalLoop`] - Natural loop detection and nesting
//!
//! # Edge Types
//!
//! - **Unconditional**: Direct jumps or fall-through to a single successor
//! - **Conditional True/False**: The two sides of an `if-*`
//! - **Switch**: Case values leading to one target, and the default
//! - **Exception**: From a throwing instruction to a handler entry
//!
//! # Lazy Computation
//!
//! Dominator trees, dominance frontiers and loop information are computed lazily on first
//! access and cached using [`std::sync::OnceLock`].

mod block;
mod builder;
mod edge;
mod graph;
mod loops;

pub use block::{BasicBlock, CatchEntry};
pub use builder::CfgBuilder;
pub use edge::CfgEdge;
pub use graph::ControlFlowGraph;
pub use loops::{detect_loops, LoopExit, LoopForest, LoopType, NaturalLoop};
