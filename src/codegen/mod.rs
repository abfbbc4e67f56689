//! Java source generation.
//!
//! The last stage of the pipeline. [`ExpressionAssembler`] lowers the SSA form of a method
//! into a [`MethodBody`] of statements, following the region tree produced by the
//! structurer and the types chosen by inference. [`JavaWriter`] prints the body as text.
//!
//! # Key Components
//!
//! - [`ExpressionAssembler`] - Inlining, phi elimination and region nesting
//! - [`MethodBody`] / [`Statement`] / [`Expression`] - The generated tree
//! - [`LocalNamer`] - Type-derived, collision-free local names
//! - [`JavaWriter`] - Text rendering with Java precedence rules
//! - [`listing`] - Raw instruction listing for methods that cannot be decompiled
//!
//! # Evaluation Order
//!
//! A value is only substituted into a later expression when nothing observable happens in
//! between: a held-back call or trapping read is written to a local as soon as another
//! call, store or trapping instruction would otherwise overtake it.

mod assembler;
mod expression;
mod listing;
mod naming;
mod render;
mod statement;

pub use assembler::ExpressionAssembler;
pub use expression::{Expression, LValue, Literal, LocalId};
pub use listing::listing;
pub use naming::{is_keyword, LocalNamer};
pub use render::JavaWriter;
pub use statement::{CatchBlock, LocalVariable, MethodBody, Statement, SwitchArm};
