// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # dexscope
//!
//! A method-body decompiler for register-based Java bytecode (the dex instruction set).
//! `dexscope` turns the flat instruction stream of a method, together with its exception
//! table, into structured and typed Java source: loops, conditionals, switches and
//! try/catch/finally blocks over nested expressions with named, typed locals.
//!
//! ## Features
//!
//! - **Control flow recovery** - Basic blocks, dominators, natural loops and a region
//!   structurer that falls back to labelled jumps instead of failing on irreducible code
//! - **SSA form** - Pruned SSA with exception-aware phi placement
//! - **Type inference** - A narrowing constraint solver that resolves every value to a
//!   concrete Java type, inserting casts where definitions and uses disagree
//! - **Order-preserving expression assembly** - Single-use values are inlined without ever
//!   moving a call, store or trapping read past another
//! - **Batch decompilation** - Methods run in parallel on a fixed-size `rayon` pool, with
//!   an injectable cache, a concurrent diagnostics channel and cooperative cancellation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dexscope::prelude::*;
//!
//! let mut asm = CodeAssembler::new();
//! asm.if_cmp(IfCondition::Le, 0, 1, "else")
//!     .return_value(0)
//!     .label("else")
//!     .return_value(1);
//! let method = asm.build_method("demo.MathUtil", "max", "(II)I", true, 2)?;
//!
//! let decompiler = Decompiler::new(DecompilerConfig::default(), Arc::new(ClassHierarchyMap::new()));
//! let outcome = decompiler.decompile_method(&method);
//! assert_eq!(outcome.status, MethodStatus::Success);
//! println!("{}", outcome.artifact.text());
//! # Ok::<(), dexscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Each method flows through the stages in order; every stage only reads the output of
//! the ones before it:
//!
//! 1. [`analysis::cfg`] - Control flow graph, dominators and loops
//! 2. [`structure`] - Region tree
//! 3. [`analysis::ssa`] - SSA values and phis
//! 4. [`analysis::typing`] - Concrete types and conversion sites
//! 5. [`codegen`] - Statements, expressions and text
//!
//! [`pipeline`] drives the stages and turns every error into a per-method status, so one
//! broken method never affects its siblings.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`](Result). Errors are classified by
//! [`ErrorKind`], which is what the diagnostics channel records:
//!
//! ```rust,ignore
//! use dexscope::{analysis::CfgBuilder, Error};
//!
//! match CfgBuilder::build(&method) {
//!     Ok(cfg) => println!("{} blocks", cfg.block_count()),
//!     Err(Error::Decode { offset, message }) => eprintln!("{offset:#x}: {message}"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use dexscope::prelude::*;
///
/// let decompiler = Decompiler::new(DecompilerConfig::default(), Arc::new(ClassHierarchyMap::new()));
/// ```
pub mod prelude;

/// Input model: opcodes, instructions, method containers and a label-based assembler.
pub mod bytecode;

/// Java types and the class-hierarchy resolver.
pub mod types;

/// Graph algorithms, bit sets and cancellation.
pub mod utils;

/// Control flow, SSA and type analyses.
pub mod analysis;

/// Region structuring of control flow graphs.
pub mod structure;

/// Statement trees and Java source rendering.
pub mod codegen;

/// Per-method orchestration, worker pool, cache and diagnostics.
pub mod pipeline;

/// Pipeline configuration.
pub mod config;

/// `dexscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dexscope` Error type
///
/// See [`ErrorKind`] for the coarse classification recorded in diagnostics.
pub use error::{Error, ErrorKind};

pub use config::DecompilerConfig;
pub use pipeline::{Artifact, Decompiler, MethodOutcome, MethodStatus};
