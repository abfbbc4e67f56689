//! Shared utilities for the analysis pipeline.
//!
//! - [`graph`] - arena graphs, traversal and dominator algorithms
//! - [`BitSet`] - dense integer sets for data-flow analyses
//! - [`CancellationToken`] - cooperative cancellation shared across worker threads

mod bitset;
pub mod graph;
mod synchronization;

pub use bitset::BitSet;
pub use synchronization::CancellationToken;
