use std::path::PathBuf;

use mfs_buffer::BufferError;
use mfs_format::FormatError;
use mfs_types::{ContentHash, TypeError};

/// Errors from block storage and tree operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested block was not found.
    #[error("block not found: {0}")]
    NotFound(ContentHash),

    /// Stored bytes no longer hash to their key (data corruption).
    #[error("hash mismatch for {hash}: computed {computed}")]
    HashMismatch {
        hash: ContentHash,
        computed: ContentHash,
    },

    /// A stored record failed to decode.
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A hash written to disk (such as the root pointer) is malformed.
    #[error("invalid hash: {0}")]
    InvalidHash(#[from] TypeError),

    /// The path given for a Merkle file is not an existing directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
