//! SSA values and their def/use sites.

use std::fmt;

use crate::{bytecode::Register, utils::graph::NodeId};

/// Unique identifier for an SSA value.
///
/// This is a lightweight handle into the value table of an
/// [`SsaFunction`](super::SsaFunction). Identifiers are dense and unique within one
/// function only.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SsaValueId(usize);

impl SsaValueId {
    /// Creates a new SSA value identifier.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for SsaValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for SsaValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where a value is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueOrigin {
    /// Incoming parameter; `index` counts the receiver of instance methods as 0.
    Parameter {
        /// Position in the parameter list
        index: usize,
    },
    /// Result of the instruction at absolute index `index`.
    ///
    /// For invokes with a paired `move-result` this is the invoke itself.
    Instruction {
        /// Defining block
        block: NodeId,
        /// Absolute instruction index
        index: usize,
    },
    /// Merge placeholder at the entry of `block`.
    Phi {
        /// Block holding the phi
        block: NodeId,
        /// Position in the block's phi list
        phi: usize,
    },
    /// Read of a register no definition reaches.
    Undefined,
}

impl fmt::Display for ValueOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter { index } => write!(f, "param{index}"),
            Self::Instruction { block, index } => write!(f, "{block}:{index}"),
            Self::Phi { block, phi } => write!(f, "{block}:phi{phi}"),
            Self::Undefined => write!(f, "undef"),
        }
    }
}

/// A read of an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseSite {
    /// Operand `operand` of the instruction at absolute index `index`.
    Instruction {
        /// Block of the reading instruction
        block: NodeId,
        /// Absolute instruction index
        index: usize,
        /// Operand position, matching [`crate::bytecode::Opcode::uses`]
        operand: usize,
    },
    /// Operand `operand` of phi `phi` in `block`.
    Phi {
        /// Block holding the phi
        block: NodeId,
        /// Position in the block's phi list
        phi: usize,
        /// Operand position, matching the block's predecessor order
        operand: usize,
    },
}

impl UseSite {
    /// Returns the block of the use.
    #[must_use]
    pub const fn block(&self) -> NodeId {
        match self {
            Self::Instruction { block, .. } | Self::Phi { block, .. } => *block,
        }
    }

    /// Returns `true` for phi operands.
    #[must_use]
    pub const fn is_phi_operand(&self) -> bool {
        matches!(self, Self::Phi { .. })
    }
}

/// One single-assignment value.
///
/// Each value has exactly one definition, given by its [`ValueOrigin`], and any number of
/// uses.
#[derive(Debug, Clone)]
pub struct SsaValue {
    id: SsaValueId,
    register: Register,
    origin: ValueOrigin,
    uses: Vec<UseSite>,
}

impl SsaValue {
    pub(crate) fn new(id: SsaValueId, register: Register, origin: ValueOrigin) -> Self {
        SsaValue {
            id,
            register,
            origin,
            uses: Vec::new(),
        }
    }

    /// Returns the value id.
    #[must_use]
    pub const fn id(&self) -> SsaValueId {
        self.id
    }

    /// Returns the register this value is a version of.
    #[must_use]
    pub const fn register(&self) -> Register {
        self.register
    }

    /// Returns where the value is defined.
    #[must_use]
    pub const fn origin(&self) -> ValueOrigin {
        self.origin
    }

    /// Returns all reads of the value.
    #[must_use]
    pub fn uses(&self) -> &[UseSite] {
        &self.uses
    }

    /// Returns the number of reads.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.uses.len()
    }

    /// Returns `true` if the value is a merge placeholder.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        matches!(self.origin, ValueOrigin::Phi { .. })
    }

    /// Returns `true` if the value is an incoming parameter.
    #[must_use]
    pub const fn is_parameter(&self) -> bool {
        matches!(self.origin, ValueOrigin::Parameter { .. })
    }

    /// Returns `true` if no definition reaches the value's reads.
    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        matches!(self.origin, ValueOrigin::Undefined)
    }

    pub(crate) fn add_use(&mut self, site: UseSite) {
        self.uses.push(site);
    }
}
