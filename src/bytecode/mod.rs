//! Decoded Dalvik method bodies: the input model of the pipeline.
//!
//! The container layer (dex parsing, constant pools, register-pair collapsing) is outside
//! this crate. What arrives here is already decoded:
//!
//! - [`Instruction`] / [`Opcode`] - one instruction at a code-unit offset, with resolved
//!   method, field, type and string references
//! - [`MethodCode`] - instructions, exception table, register frame and signature
//! - [`ClassCode`] - the methods of one class, the unit of batch decompilation
//! - [`CodeAssembler`] - builds method bodies from symbolic labels
//!
//! # Invariants
//!
//! Offsets are strictly increasing. Branch targets and handler offsets must name the start
//! of an instruction; the instruction graph builder rejects anything else with
//! [`crate::Error::Decode`].

mod assembler;
mod instruction;
mod method;

pub use assembler::CodeAssembler;
pub use instruction::{
    ArrayKind, BinaryOp, CompareKind, FlowType, IfCondition, Instruction, InvokeKind,
    NumericKind, Opcode, Operand, Register, UnaryOp,
};
pub use method::{
    ClassCode, ExceptionHandler, FieldRef, MethodCode, MethodDescriptor, MethodKey, MethodRef,
};
