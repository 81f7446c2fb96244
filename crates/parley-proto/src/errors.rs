//! Codec error types.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames.
///
/// Only [`ProtocolError::FrameTooShort`] is expected during normal operation:
/// it means the stream has not delivered the whole frame yet and the caller
/// should retry once more bytes arrive. Every other variant means the peer
/// sent something this side will never accept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes are available than the header and trailer require.
    #[error("frame too short: expected {expected} bytes, have {actual}")]
    FrameTooShort {
        /// Bytes needed for the complete frame (or header, if not yet known)
        expected: usize,
        /// Bytes currently available
        actual: usize,
    },

    /// A declared length in an inbound header exceeds [`crate::MAX_FIELD_LEN`].
    #[error("{field} length {length} exceeds maximum {max}")]
    LengthOverflow {
        /// Which header field overflowed
        field: &'static str,
        /// Declared length
        length: usize,
        /// Maximum accepted length
        max: usize,
    },

    /// An outbound field is too large to be encoded.
    #[error("{field} is {length} bytes, maximum is {max}")]
    FieldTooLarge {
        /// Which field was too large
        field: &'static str,
        /// Actual length
        length: usize,
        /// Maximum encodable length
        max: usize,
    },

    /// The frame type is not valid in this position.
    #[error("unexpected frame type {0:#06x}")]
    UnexpectedOpcode(u16),

    /// A structurally valid frame whose payload cannot be interpreted.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl ProtocolError {
    /// True if this error only means "wait for more bytes".
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::FrameTooShort { .. })
    }
}
