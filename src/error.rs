use strum::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! decode_error {
    ($offset:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::Decode {
            offset: $offset,
            message: format!($fmt $(, $arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every error produced by the method pipeline is scoped to the single method being
/// decompiled. The [`crate::pipeline::Decompiler`] converts them into a
/// [`crate::pipeline::MethodStatus`] and a best-effort artifact instead of propagating them
/// to sibling methods, so callers of the batch API rarely see these values directly.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Decode`] - Malformed instruction stream, branch target or handler table
/// - [`Error::Malformed`] - Malformed descriptor or builder input, with source location
///
/// ## Analysis Errors
/// - [`Error::Structuring`] - Region structuring exceeded its iteration bound
/// - [`Error::Ssa`] - Register renaming found an inconsistent graph
/// - [`Error::TypeConflict`] - Incompatible type constraints (internal, resolved by conversion)
/// - [`Error::Resolution`] - A referenced class is unknown to the class hierarchy
/// - [`Error::GraphError`] - Invalid graph operation
///
/// ## Run Control
/// - [`Error::Cancelled`] - The caller abandoned the run at a cancellation checkpoint
/// - [`Error::ThreadPool`] - The worker pool could not be created
///
/// # Examples
///
/// ```rust,ignore
/// use dexscope::{Error, analysis::CfgBuilder};
///
/// match CfgBuilder::build(&method) {
///     Ok(cfg) => println!("{} blocks", cfg.block_count()),
///     Err(Error::Decode { offset, message }) => {
///         eprintln!("bad bytecode at {offset:#x}: {message}");
///     }
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The instruction stream or exception table of a method is malformed.
    ///
    /// Raised by the instruction graph builder for branch targets outside the method,
    /// non-monotonic offsets, handler ranges that do not land on instructions and code that
    /// falls off the end of the method.
    ///
    /// # Fields
    ///
    /// * `offset` - Code-unit offset of the offending instruction or handler entry
    /// * `message` - Description of the violation
    #[error("Decode error at offset {offset:#06x}: {message}")]
    Decode {
        /// Code-unit offset of the offending instruction
        offset: u32,
        /// Description of the violation
        message: String,
    },

    /// The input is damaged or otherwise malformed.
    ///
    /// Used for descriptor strings, unresolved assembler labels and internal invariant
    /// violations. The macro `malformed_error!` records the source location.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Region structuring did not reach a single root within the configured bound.
    ///
    /// The pipeline recovers from this by rendering the method as a flat goto region.
    #[error("Structuring failed: {0}")]
    Structuring(String),

    /// SSA construction failed.
    #[error("SSA construction failed: {0}")]
    Ssa(String),

    /// Two type constraints on one value have no common type.
    ///
    /// Never surfaced by the pipeline: the type solver answers this error by recording an
    /// explicit conversion instead of narrowing the value.
    #[error("Type conflict: {0}")]
    TypeConflict(String),

    /// A referenced class or member is absent from the class hierarchy.
    ///
    /// Type inference degrades the affected value to `java.lang.Object` and keeps going.
    #[error("Resolution failed: {0}")]
    Resolution(String),

    /// Graph operation error.
    ///
    /// Returned when adding edges between nodes that do not exist.
    #[error("{0}")]
    GraphError(String),

    /// The run was cancelled at a cooperative checkpoint.
    #[error("Operation cancelled")]
    Cancelled,

    /// The fixed-size worker pool could not be constructed.
    #[error("{0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Coarse classification of an [`Error`], recorded by the diagnostics channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed bytecode or handler table
    Decode,
    /// Structuring bound exceeded
    Structuring,
    /// SSA construction failure
    Ssa,
    /// Type constraint conflict
    TypeConflict,
    /// Missing class or member
    Resolution,
    /// Cancelled by the caller
    Cancelled,
    /// Anything else
    Internal,
}

impl Error {
    /// Returns the diagnostic classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decode { .. } => ErrorKind::Decode,
            Error::Structuring(_) => ErrorKind::Structuring,
            Error::Ssa(_) => ErrorKind::Ssa,
            Error::TypeConflict(_) => ErrorKind::TypeConflict,
            Error::Resolution(_) => ErrorKind::Resolution,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Malformed { .. } | Error::GraphError(_) | Error::ThreadPool(_) => {
                ErrorKind::Internal
            }
        }
    }
}
