use std::collections::HashMap;
use std::sync::RwLock;

use mfs_types::ContentHash;
use tracing::debug;

use crate::error::StoreResult;
use crate::traits::ObjectStore;

/// In-memory, HashMap-based block store.
///
/// Intended for tests and embedding. Blocks live behind a `RwLock` and are
/// cloned on read and write.
pub struct InMemoryObjectStore {
    blocks: RwLock<HashMap<ContentHash, Vec<u8>>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no blocks are stored.
    pub fn is_empty(&self) -> bool {
        self.blocks.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blocks.
    pub fn total_bytes(&self) -> u64 {
        self.blocks
            .read()
            .expect("lock poisoned")
            .values()
            .map(|block| block.len() as u64)
            .sum()
    }

    /// Remove every block.
    pub fn clear(&self) {
        self.blocks.write().expect("lock poisoned").clear();
    }

    /// Sorted list of every stored hash.
    pub fn all_hashes(&self) -> Vec<ContentHash> {
        let map = self.blocks.read().expect("lock poisoned");
        let mut hashes: Vec<ContentHash> = map.keys().copied().collect();
        hashes.sort();
        hashes
    }

    /// Replace the bytes stored under `hash`, bypassing content addressing.
    #[cfg(test)]
    pub(crate) fn corrupt(&self, hash: ContentHash, data: Vec<u8>) {
        self.blocks.write().expect("lock poisoned").insert(hash, data);
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.get(hash).cloned())
    }

    fn write(&self, data: &[u8]) -> StoreResult<ContentHash> {
        let hash = ContentHash::digest(data);
        let mut map = self.blocks.write().expect("lock poisoned");
        map.entry(hash).or_insert_with(|| {
            debug!(%hash, len = data.len(), "stored block");
            data.to_vec()
        });
        Ok(hash)
    }

    fn exists(&self, hash: &ContentHash) -> StoreResult<bool> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.contains_key(hash))
    }

    fn delete(&self, hash: &ContentHash) -> StoreResult<bool> {
        let mut map = self.blocks.write().expect("lock poisoned");
        Ok(map.remove(hash).is_some())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("block_count", &self.len())
            .finish()
    }
}
