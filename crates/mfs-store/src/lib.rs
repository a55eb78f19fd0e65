//! Content-addressed block storage for MFS.
//!
//! Blocks are stored under the SHA-1 of their bytes, the same hash a
//! [`MerkleNode`](mfs_format::MerkleNode) carries. A directory node therefore
//! resolves its children by hash alone, without knowing where they live.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`]: `HashMap`-based store for tests and embedding
//! - [`LooseObjectStore`]: one file per block in a fan-out directory
//!
//! On top of a store, [`MerkleTree`] stores and resolves nodes, walks a tree
//! and verifies it. [`MerkleFile`] packages a loose store, its settings and a
//! root pointer into a single directory.
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once written.
//! 2. Writes are idempotent and the first writer of a hash wins.
//! 3. The store never interprets block contents. Only the tree service decodes.

pub mod config;
pub mod error;
pub mod file;
pub mod loose;
pub mod memory;
pub mod traits;
pub mod tree;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use file::MerkleFile;
pub use loose::LooseObjectStore;
pub use memory::InMemoryObjectStore;
pub use traits::ObjectStore;
pub use tree::{MerkleTree, VerifyReport, WalkEntry};
