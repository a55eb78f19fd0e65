use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use mfs_types::ContentHash;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::ObjectStore;

/// One file per block under `<root>/<2 hex>/<38 hex>`.
///
/// A block is first written to a temporary file in its fan-out directory and
/// then linked into place without replacing an existing file. When two
/// writers race on the same content, one link wins and the other finds the
/// file already present, so both succeed.
#[derive(Debug)]
pub struct LooseObjectStore {
    root: PathBuf,
    config: StoreConfig,
}

impl LooseObjectStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>, config: StoreConfig) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, config })
    }

    /// Directory holding the fan-out subdirectories.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Settings this store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Location of the file holding `hash`.
    pub fn object_path(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    /// Every stored hash, sorted. Stray files that do not name a hash are skipped.
    pub fn all_hashes(&self) -> StoreResult<Vec<ContentHash>> {
        let mut hashes = Vec::new();
        for fan in fs::read_dir(&self.root)? {
            let fan = fan?;
            if !fan.file_type()?.is_dir() {
                continue;
            }
            let prefix = fan.file_name().to_string_lossy().into_owned();
            for entry in fs::read_dir(fan.path())? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if let Ok(hash) = ContentHash::from_hex(&format!("{prefix}{name}")) {
                    hashes.push(hash);
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}

impl ObjectStore for LooseObjectStore {
    fn read(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        let data = match fs::read(self.object_path(hash)) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if self.config.verify_on_read {
            let computed = ContentHash::digest(&data);
            if computed != *hash {
                warn!(%hash, %computed, "stored block fails verification");
                return Err(StoreError::HashMismatch {
                    hash: *hash,
                    computed,
                });
            }
        }
        debug!(%hash, len = data.len(), "read block");
        Ok(Some(data))
    }

    fn write(&self, data: &[u8]) -> StoreResult<ContentHash> {
        let hash = ContentHash::digest(data);
        let path = self.object_path(&hash);
        if path.is_file() {
            debug!(%hash, "block already stored");
            return Ok(hash);
        }
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(data)?;
        if self.config.fsync {
            tmp.as_file().sync_all()?;
        }
        match tmp.persist_noclobber(&path) {
            Ok(_) => debug!(%hash, len = data.len(), "stored block"),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                debug!(%hash, "block stored concurrently");
            }
            Err(e) => return Err(e.error.into()),
        }
        Ok(hash)
    }

    fn exists(&self, hash: &ContentHash) -> StoreResult<bool> {
        Ok(self.object_path(hash).is_file())
    }

    fn delete(&self, hash: &ContentHash) -> StoreResult<bool> {
        match fs::remove_file(self.object_path(hash)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn temp_store(config: StoreConfig) -> (tempfile::TempDir, LooseObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseObjectStore::open(dir.path().join("objects"), config).unwrap();
        (dir, store)
    }

    #[test]
    fn fan_out_layout() {
        let (_dir, store) = temp_store(StoreConfig::default());
        let hash = store.write(b"Hello World").unwrap();
        let path = store.object_path(&hash);
        assert!(path.ends_with("0a/4d55a8d778e5022fab701977c5d840bbc486d0"));
        assert_eq!(fs::read(path).unwrap(), b"Hello World");
    }

    #[test]
    fn write_read_delete() {
        let (_dir, store) = temp_store(StoreConfig::default());
        let hash = store.write(b"block").unwrap();
        assert!(store.exists(&hash).unwrap());
        assert_eq!(store.read(&hash).unwrap().as_deref(), Some(&b"block"[..]));
        assert!(store.delete(&hash).unwrap());
        assert!(!store.delete(&hash).unwrap());
        assert!(store.read(&hash).unwrap().is_none());
    }

    #[test]
    fn empty_block() {
        let (_dir, store) = temp_store(StoreConfig::default());
        let hash = store.write(b"").unwrap();
        assert_eq!(store.read(&hash).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn rewrite_keeps_first_copy() {
        let (_dir, store) = temp_store(StoreConfig {
            fsync: true,
            verify_on_read: false,
        });
        let hash = store.write(b"original").unwrap();
        let path = store.object_path(&hash);
        let before = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(store.write(b"original").unwrap(), hash);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn corruption_detected_on_read() {
        let (_dir, store) = temp_store(StoreConfig::default());
        let hash = store.write(b"pristine").unwrap();
        fs::write(store.object_path(&hash), b"tampered").unwrap();
        assert!(matches!(
            store.read(&hash),
            Err(StoreError::HashMismatch { .. })
        ));
    }

    #[test]
    fn corruption_passes_without_verification() {
        let (_dir, store) = temp_store(StoreConfig {
            fsync: false,
            verify_on_read: false,
        });
        let hash = store.write(b"pristine").unwrap();
        fs::write(store.object_path(&hash), b"tampered").unwrap();
        assert_eq!(store.read(&hash).unwrap().as_deref(), Some(&b"tampered"[..]));
    }

    #[test]
    fn lists_stored_hashes() {
        let (_dir, store) = temp_store(StoreConfig::default());
        let mut expected: Vec<ContentHash> =
            (0..5u8).map(|i| store.write(&[i; 3]).unwrap()).collect();
        expected.sort();
        fs::write(store.root().join("README"), b"not a block").unwrap();
        assert_eq!(store.all_hashes().unwrap(), expected);
    }

    #[test]
    fn concurrent_writers_of_same_content() {
        let (_dir, store) = temp_store(StoreConfig::default());
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.write(b"contended").unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), ContentHash::digest(b"contended"));
        }
        assert_eq!(store.all_hashes().unwrap().len(), 1);
        let fan = store.object_path(&ContentHash::digest(b"contended"));
        let leftovers = fs::read_dir(fan.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
