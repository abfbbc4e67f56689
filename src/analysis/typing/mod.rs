//! Type inference over SSA values.
//!
//! Dalvik registers are untyped: `const v0, 0` may be an `int`, a `float`, a `boolean` or
//! `null`, and only the uses of a value tell which. Inference works in three steps:
//!
//! 1. Constraint collection turns every definition and use into a constraint on a value
//! 2. [`TypeInference`] narrows a [`TypeKinds`] set per value until a fixed point, while
//!    reference types are joined upward through the [`crate::types::ClassHierarchy`]
//! 3. Resolution picks one concrete type per value, and records a conversion wherever a
//!    value cannot be used as-is
//!
//! Conflicts are never fatal. A use that cannot be satisfied becomes a
//! [`ConversionSite`] with a target type, and a copy whose ends disagree is cut and
//! converted at the copy.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dexscope::analysis::TypeInference;
//!
//! let types = TypeInference::new(&cfg, &ssa, &method, &hierarchy)
//!     .with_max_rounds(config.max_type_iterations)
//!     .solve()?;
//!
//! for (site, target) in types.conversions() {
//!     println!("{site:?} needs a cast to {target}");
//! }
//! ```

mod constraint;
mod inference;
mod kinds;

pub use constraint::{ConversionSite, TypeConstraint};
pub use inference::{TypeAssignment, TypeInference};
pub use kinds::TypeKinds;
