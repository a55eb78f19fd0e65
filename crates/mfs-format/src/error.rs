use mfs_buffer::BufferError;
use mfs_types::MfsType;
use thiserror::Error;

/// Errors from encoding or decoding MFS records.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The leading tag does not match the decoder invoked.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: MfsType, actual: MfsType },

    #[error("unsupported {kind} version: {version}")]
    UnsupportedVersion { kind: MfsType, version: u8 },

    /// Merkle node header signature is corrupted.
    #[error("signature mismatch: expected {expected:?}, found {actual:?}")]
    SignatureMismatch { expected: [u8; 4], actual: [u8; 4] },

    /// No decoder is registered for the tag.
    #[error("unrecognized object type tag: {0:#04x}")]
    UnrecognizedType(u8),

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Result alias for record encoding and decoding.
pub type FormatResult<T> = Result<T, FormatError>;
