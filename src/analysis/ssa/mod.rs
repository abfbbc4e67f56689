//! Static Single Assignment (SSA) form for register bytecode.
//!
//! This module renames the mutable registers of a method into values that are each
//! assigned exactly once. Reads are bound to their reaching definition, and control flow
//! joins merge competing definitions through phi nodes.
//!
//! # Architecture
//!
//! - [`value`] - Value identifiers, origins and use sites
//! - [`phi`] - Phi nodes for control flow merges
//! - [`function`] - Per-block SSA instructions and the value table
//! - [`builder`] - SSA construction (Cytron et al.)
//!
//! # Register Semantics
//!
//! - Parameters are defined on entry, in the last registers of the frame
//! - An invoke defines the value of its paired `move-result`, which is folded away
//! - `check-cast r` defines a new, narrowed version of `r`
//! - Exception handlers see register values as they were at the throwing instruction
//!
//! # Usage
//!
//! ```rust,ignore
//! use dexscope::analysis::{CfgBuilder, RegisterLiveness, SsaBuilder};
//!
//! let cfg = CfgBuilder::build(&method)?;
//! let liveness = RegisterLiveness::compute(&cfg, method.registers);
//! let ssa = SsaBuilder::build(&cfg, &method, &liveness)?;
//!
//! for (block, phi) in ssa.phis() {
//!     println!("{block}: {:?} = phi({:?})", phi.result(), phi.operands());
//! }
//! ```
//!
//! # References
//!
//! - Cytron et al., "Efficiently Computing Static Single Assignment Form and the
//!   Control Dependence Graph", ACM TOPLAS 1991
//! - Briggs et al., "Practical Improvements to the Construction and Destruction of
//!   Static Single Assignment Form", 1998 (pruned placement, parallel copies)

mod builder;
mod function;
mod phi;
mod value;

pub use builder::SsaBuilder;
pub use function::{SsaBlock, SsaFunction, SsaInstruction};
pub use phi::{PhiNode, PhiOperand};
pub use value::{SsaValue, SsaValueId, UseSite, ValueOrigin};
