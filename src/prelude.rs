//! # dexscope Prelude
//!
//! The types needed to build methods, run the decompiler and inspect its output, for
//! glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dexscope operations
pub use crate::Error;

/// Coarse error classification
pub use crate::ErrorKind;

/// The result type used throughout dexscope
pub use crate::Result;

/// Pipeline configuration
pub use crate::DecompilerConfig;

// ================================================================================================
// Input Model
// ================================================================================================

/// Opcodes, instructions and method containers
pub use crate::bytecode::{
    BinaryOp, ClassCode, CodeAssembler, CompareKind, ExceptionHandler, FieldRef, IfCondition,
    Instruction, InvokeKind, MethodCode, MethodDescriptor, MethodKey, MethodRef, NumericKind,
    Opcode, Operand,
};

/// Java types and the class hierarchy
pub use crate::types::{ClassHierarchy, ClassHierarchyMap, ClassInfo, JavaType, TypeRef};

// ================================================================================================
// Pipeline
// ================================================================================================

/// Orchestration, caching and diagnostics
pub use crate::pipeline::{
    Artifact, ClassOutcome, Decompiler, DiagnosticsSink, MemoryCache, MethodCache,
    MethodOutcome, MethodRecord, MethodStatus,
};

/// Cooperative cancellation
pub use crate::utils::CancellationToken;

// ================================================================================================
// Stages
// ================================================================================================

/// Analyses
pub use crate::analysis::{
    CfgBuilder, ControlFlowGraph, RegisterLiveness, SsaBuilder, SsaFunction, TypeAssignment,
    TypeInference,
};

/// Structuring
pub use crate::structure::{Region, Structure, Structurer};

/// Code generation
pub use crate::codegen::{ExpressionAssembler, JavaWriter, MethodBody, Statement};
