use thiserror::Error;

/// Errors from buffer operations.
#[derive(Debug, Error)]
pub enum BufferError {
    /// A write would exceed capacity, or a read would exceed the remaining bytes.
    #[error("buffer overflow: requested {requested} bytes, {available} available")]
    BufferOverflow { requested: usize, available: usize },

    /// Seek target outside `[0, capacity]`.
    #[error("position {position} out of range for buffer of capacity {capacity}")]
    OutOfRange { position: i128, capacity: usize },

    /// Integer width other than 1, 2, 4 or 8 bytes.
    #[error("unsupported integer width: {0}")]
    UnsupportedWidth(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;
