use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use mfs_types::ContentHash;
use tempfile::NamedTempFile;
use tracing::info;

use crate::config::{StoreConfig, CONFIG_FILE};
use crate::error::{StoreError, StoreResult};
use crate::loose::LooseObjectStore;
use crate::tree::MerkleTree;

/// File holding the hex hash of the current root node.
pub const ROOT_FILE: &str = "ROOT";

/// Directory holding the loose blocks.
pub const OBJECTS_DIR: &str = "objects";

/// A Merkle file: a directory holding a block store and a root pointer.
///
/// ```text
/// <dir>/config.toml        optional StoreConfig
/// <dir>/ROOT               hex hash of the root node, absent until set
/// <dir>/objects/ab/cdef..  one file per block
/// ```
#[derive(Debug)]
pub struct MerkleFile {
    path: PathBuf,
    store: LooseObjectStore,
}

impl MerkleFile {
    /// Open an existing Merkle file directory.
    ///
    /// Settings come from `<dir>/config.toml` when present, otherwise the
    /// defaults.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let config = StoreConfig::load_or_default(&path.join(CONFIG_FILE))?;
        Self::open_with_config(path, config)
    }

    /// Open an existing Merkle file directory with explicit settings.
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(StoreError::NotADirectory(path.to_path_buf()));
        }
        let store = LooseObjectStore::open(path.join(OBJECTS_DIR), config)?;
        info!(path = %path.display(), "opened merkle file");
        Ok(Self {
            path: path.to_path_buf(),
            store,
        })
    }

    /// Create the directory layout (if needed) and open it.
    ///
    /// `config` is written to `<dir>/config.toml` unless one already exists.
    pub fn init(path: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let path = path.as_ref();
        if path.exists() && !path.is_dir() {
            return Err(StoreError::NotADirectory(path.to_path_buf()));
        }
        fs::create_dir_all(path.join(OBJECTS_DIR))?;
        let config_path = path.join(CONFIG_FILE);
        if !config_path.exists() {
            fs::write(&config_path, config.to_toml_string()?)?;
        }
        info!(path = %path.display(), "initialized merkle file");
        Self::open(path)
    }

    /// The Merkle file directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The block store under `objects/`.
    pub fn store(&self) -> &LooseObjectStore {
        &self.store
    }

    /// Settings in effect for this file.
    pub fn config(&self) -> &StoreConfig {
        self.store.config()
    }

    /// Tree service over this file's store.
    pub fn tree(&self) -> MerkleTree<&LooseObjectStore> {
        MerkleTree::new(&self.store)
    }

    /// The current root node, if one has been set.
    pub fn root(&self) -> StoreResult<Option<ContentHash>> {
        match fs::read_to_string(self.path.join(ROOT_FILE)) {
            Ok(text) => Ok(Some(ContentHash::from_hex(text.trim())?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Point the file at a new root node, replacing the previous pointer atomically.
    pub fn set_root(&self, hash: &ContentHash) -> StoreResult<()> {
        let mut tmp = NamedTempFile::new_in(&self.path)?;
        writeln!(tmp, "{hash}")?;
        if self.config().fsync {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(self.path.join(ROOT_FILE))
            .map_err(|e| StoreError::Io(e.error))?;
        info!(root = %hash, "updated root");
        Ok(())
    }
}
