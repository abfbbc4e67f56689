//! Graph algorithms for control-flow analysis.
//!
//! # Available Algorithms
//!
//! ## Traversal
//!
//! - [`postorder`] - Depth-first post-order
//! - [`reverse_postorder`] - Reverse post-order (forward data-flow iteration order)
//! - [`reachable`] - Reachability marks from a start node
//!
//! ## Dominator Analysis
//!
//! - [`compute_dominators`] - Dominator tree (Cooper-Harvey-Kennedy)
//! - [`compute_dominance_frontiers`] - Dominance frontiers for phi placement
//! - [`DominatorTree`] - Result of dominator computation
//!
//! # Algorithm Selection
//!
//! | Algorithm | Time Complexity | Use Case |
//! |-----------|-----------------|----------|
//! | Post-order / RPO | O(V + E) | Data-flow ordering, reachability pruning |
//! | Dominators | O(V + E) per pass, few passes | Loops, SSA, structuring |
//! | Dominance frontiers | O(V + E + size of frontiers) | Phi placement |

mod dominators;
mod traversal;

pub use dominators::{
    compute_dominance_frontiers, compute_dominators, compute_dominators_rooted, DominatorTree,
};
pub use traversal::{postorder, reachable, reverse_postorder};
