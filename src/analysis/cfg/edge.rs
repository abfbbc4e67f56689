//! Control flow edge types for the CFG.

/// The kind of control flow represented by an edge.
///
/// Parallel edges are merged during construction, so a pair of blocks is connected by at
/// most one edge and the edge carries everything that leads along it: all switch case
/// values, or all exception table entries sharing a handler block.
///
/// # Examples
///
/// ```rust,ignore
/// use dexscope::analysis::CfgEdge;
///
/// assert!(CfgEdge::ConditionalTrue.is_conditional());
/// assert!(CfgEdge::Exception { handlers: vec![0] }.is_exceptional());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CfgEdge {
    /// Fall-through, `goto`, or a conditional branch whose target equals its fall-through.
    Unconditional,

    /// The taken side of an `if-*`.
    ConditionalTrue,

    /// The fall-through side of an `if-*`.
    ConditionalFalse,

    /// One or more switch cases leading to the same block.
    Switch {
        /// Case keys leading along this edge, in case-table order
        cases: Vec<i32>,
        /// `true` if the default (fall-through) also leads here
        default: bool,
    },

    /// Edge from a throwing instruction to an exception handler entry.
    Exception {
        /// Indices into the method's exception table, in priority order
        handlers: Vec<usize>,
    },
}

impl CfgEdge {
    /// Returns `true` for either side of a conditional branch.
    #[must_use]
    pub const fn is_conditional(&self) -> bool {
        matches!(self, Self::ConditionalTrue | Self::ConditionalFalse)
    }

    /// Returns `true` for exception edges.
    #[must_use]
    pub const fn is_exceptional(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }

    /// Returns `true` for switch edges.
    #[must_use]
    pub const fn is_switch(&self) -> bool {
        matches!(self, Self::Switch { .. })
    }

    /// Returns `true` for every edge taken without an exception.
    #[must_use]
    pub const fn is_normal(&self) -> bool {
        !self.is_exceptional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_classification() {
        assert!(CfgEdge::ConditionalFalse.is_conditional());
        assert!(!CfgEdge::Unconditional.is_conditional());
        assert!(CfgEdge::Switch {
            cases: vec![1, 2],
            default: false
        }
        .is_switch());
        let exceptional = CfgEdge::Exception { handlers: vec![0] };
        assert!(exceptional.is_exceptional());
        assert!(!exceptional.is_normal());
    }
}
