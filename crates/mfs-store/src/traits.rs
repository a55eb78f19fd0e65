use mfs_types::ContentHash;

use crate::error::StoreResult;

/// Content-addressed block store.
///
/// All implementations must satisfy these invariants:
/// - A block is keyed by the SHA-1 of its bytes and never changes once written.
/// - Writes are idempotent. The first writer of a hash wins and later writers
///   of the same content succeed without touching it.
/// - The store never interprets block contents.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read a block by hash.
    ///
    /// Returns `Ok(None)` if the block does not exist.
    fn read(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>>;

    /// Write a block and return its content hash.
    fn write(&self, data: &[u8]) -> StoreResult<ContentHash>;

    fn exists(&self, hash: &ContentHash) -> StoreResult<bool>;

    /// Delete a block. Returns `true` if it existed.
    ///
    /// Deleting a block that is still referenced breaks the tree above it.
    fn delete(&self, hash: &ContentHash) -> StoreResult<bool>;

    /// Read several blocks. The default calls [`read`](Self::read) for each.
    fn read_batch(&self, hashes: &[ContentHash]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        hashes.iter().map(|hash| self.read(hash)).collect()
    }

    /// Write several blocks. The default calls [`write`](Self::write) for each.
    fn write_batch(&self, blocks: &[&[u8]]) -> StoreResult<Vec<ContentHash>> {
        blocks.iter().map(|block| self.write(block)).collect()
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn read(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        (**self).read(hash)
    }

    fn write(&self, data: &[u8]) -> StoreResult<ContentHash> {
        (**self).write(data)
    }

    fn exists(&self, hash: &ContentHash) -> StoreResult<bool> {
        (**self).exists(hash)
    }

    fn delete(&self, hash: &ContentHash) -> StoreResult<bool> {
        (**self).delete(hash)
    }
}
