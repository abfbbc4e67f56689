//! Method pipeline orchestration.
//!
//! [`Decompiler`] runs each method independently through graph building, structuring, SSA
//! construction, type inference and expression assembly. Batches of classes are spread
//! over a fixed-size `rayon` pool; nothing is shared between method runs except the
//! read-only class hierarchy, the optional [`MethodCache`] and the [`DiagnosticsSink`].
//!
//! # Failure Handling
//!
//! Every error is scoped to one method and turned into a [`MethodStatus`]:
//!
//! - A decode, SSA or typing failure yields [`MethodStatus::Failed`] with a raw
//!   instruction listing as the artifact
//! - A structuring failure yields [`MethodStatus::Degraded`]; the method is still
//!   decompiled, with the whole graph rendered as labelled blocks and explicit jumps
//! - Cancellation yields [`MethodStatus::Cancelled`]; cancelled outcomes are not cached
//!
//! # Determinism
//!
//! A method's outcome depends only on its code, the configuration and the hierarchy.
//! Batch results are collected in input order.

mod cache;
mod decompiler;
mod diagnostics;

pub use cache::{MemoryCache, MethodCache};
pub use decompiler::{Artifact, ClassOutcome, Decompiler, MethodOutcome};
pub use diagnostics::{DiagnosticsSink, MethodRecord, MethodStatus};
