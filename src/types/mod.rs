//! Java types and the class-hierarchy resolver.
//!
//! - [`JavaType`], [`PrimitiveType`], [`TypeRef`] - types as they appear in descriptors and
//!   declarations
//! - [`ClassHierarchy`] - the read-only resolver consulted by type inference
//! - [`ClassHierarchyMap`] - a concurrent in-memory resolver

mod hierarchy;
mod ty;

pub use hierarchy::{ClassHierarchy, ClassHierarchyMap, ClassInfo};
pub use ty::{JavaType, PrimitiveType, TypeRef};
