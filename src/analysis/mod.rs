//! Program analysis over decoded method bodies.
//!
//! This module holds the analyses the decompiler runs on every method before structuring
//! and expression assembly. Each builds on the previous one:
//!
//! - [`cfg`] - Basic blocks, control flow graph, dominators and natural loops
//! - [`liveness`] - Backward register liveness, used to prune phi placement
//! - [`ssa`] - Static single assignment form over the method's registers
//! - [`typing`] - Constraint-based type inference over SSA values
//!
//! # Usage
//!
//! ```rust,ignore
//! use dexscope::analysis::{CfgBuilder, RegisterLiveness, SsaBuilder, TypeInference};
//!
//! let cfg = CfgBuilder::build(&method)?;
//! let liveness = RegisterLiveness::compute(&cfg, method.registers);
//! let ssa = SsaBuilder::build(&cfg, &method, &liveness)?;
//! let types = TypeInference::new(&cfg, &ssa, &method, &hierarchy).solve()?;
//! ```

pub mod cfg;
pub mod liveness;
pub mod ssa;
pub mod typing;

pub use cfg::{
    BasicBlock, CatchEntry, CfgBuilder, CfgEdge, ControlFlowGraph, LoopForest, NaturalLoop,
};
pub use liveness::RegisterLiveness;
pub use ssa::{PhiNode, SsaBuilder, SsaFunction, SsaValue, SsaValueId, UseSite, ValueOrigin};
pub use typing::{ConversionSite, TypeAssignment, TypeInference, TypeKinds};
