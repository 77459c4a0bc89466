use thiserror::Error;

use crate::ir::{BlockId, ValueId, VerifyIrError};

/// Fatal errors of one frame build. The function being built is left in an
/// unspecified state and should be abandoned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameBuildError {
    #[error("continuation state invariant violated: {message}")]
    InvariantViolation { message: String, dump: String },

    #[error("cannot store {value} in the continuation state: {reason}")]
    UnsupportedType { value: ValueId, reason: String },

    #[error("stack allocation {value} has a dynamic size")]
    DynamicAlloca { value: ValueId },

    #[error("malformed suspend in {block}: {reason}")]
    MalformedSuspend { block: BlockId, reason: String },

    #[error("loop headed by {header} has no pre-header")]
    MissingPreheader { header: BlockId },

    #[error("no definition of {value} reaches its use in {block}")]
    AmbiguousUseDef { value: ValueId, block: BlockId },

    #[error("frame address placeholder left in {block}")]
    UnresolvedFrameAddress { block: BlockId },

    #[error(transparent)]
    Verify(#[from] VerifyIrError),
}

impl FrameBuildError {
    /// Debug dump attached to an invariant violation, if any.
    pub fn dump(&self) -> Option<&str> {
        match self {
            FrameBuildError::InvariantViolation { dump, .. } => Some(dump),
            _ => None,
        }
    }
}
