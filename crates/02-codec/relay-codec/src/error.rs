use thiserror::Error;

/// Why a string argument could not be marshalled faithfully.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TruncationReason {
    /// An interior NUL would make the C-visible length shorter than the
    /// reported one.
    InteriorNul {
        /// Byte offset of the first NUL.
        at: usize,
    },
    /// The string exceeds the configured limit.
    TooLong {
        /// Length of the string in bytes.
        len: usize,
        /// Configured maximum.
        limit: usize,
    },
}

/// Errors produced by [`marshal`](crate::marshal) and
/// [`unmarshal`](crate::unmarshal).
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer could not be allocated or would exceed the payload limit.
    #[error("payload allocation of {requested} bytes failed")]
    AllocationFailed {
        /// Bytes the encoding needs.
        requested: usize,
    },

    /// A string argument would be truncated on the wire.
    #[error("argument {index} would be truncated: {reason:?}")]
    Truncated {
        /// Position of the offending argument or record field.
        index: usize,
        /// What went wrong.
        reason: TruncationReason,
    },

    /// The arguments do not match the requested shape.
    #[error("arguments do not match the declared shape")]
    ShapeMismatch,

    /// Encoded bytes ended early or carried an invalid value.
    #[error("malformed payload at byte {offset}")]
    Malformed {
        /// Offset where decoding stopped.
        offset: usize,
    },
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
