//! Recoverable, boundary-facing errors.
//!
//! Almost everything this crate detects going wrong is an internal-consistency failure - a use
//! before a def, a phi that survived past phi-elimination - and those stay `panic!`s the way the
//! design treats them: fatal, no recovery, diagnostic on the way down. `CodegenError` exists only
//! for the much smaller set of conditions a caller can hit by feeding this crate inputs that are
//! merely too large for the dense `u32` entity-id space, rather than wrong.

use thiserror::Error;

/// Errors a caller can reasonably check for before one of this crate's internal invariants would
/// otherwise panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    /// A call site passed more arguments than the calling convention's register-plus-stack
    /// scheme can address.
    #[error("call with {0} arguments exceeds the supported arity")]
    UnsupportedArity(usize),

    /// A function tried to mint more locals than fit in the dense `u32` id space.
    #[error("function exhausted its local id space")]
    TooManyLocals,

    /// A function tried to mint more blocks than fit in the dense `u32` id space.
    #[error("function exhausted its block id space")]
    TooManyBlocks,
}

/// Convenience alias for the common `Result<T, CodegenError>`.
pub type CodegenResult<T> = Result<T, CodegenError>;
