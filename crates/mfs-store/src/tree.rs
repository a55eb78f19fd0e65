use std::collections::HashSet;

use mfs_buffer::ByteBuffer;
use mfs_format::{builtin_registry, decode_any, Encode, MerkleNode, MerkleNodeHeader, ObjectHeader};
use mfs_types::{ContentHash, MfsType};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::ObjectStore;

/// A reference reached while walking a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalkEntry {
    /// Depth below the root node (direct children are at depth 1).
    pub depth: usize,
    /// The node holding the reference.
    pub parent: ContentHash,
    pub node: MerkleNode,
}

/// Result of checking every block reachable from a root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Distinct Merkle nodes decoded, the root included.
    pub nodes: usize,
    /// Distinct leaf blocks checked.
    pub blocks: usize,
    pub missing: Vec<ContentHash>,
    /// Blocks whose bytes do not match their hash, fail to decode, or carry
    /// a different tag than their reference claims.
    pub corrupt: Vec<ContentHash>,
}

impl VerifyReport {
    /// Returns `true` if nothing was missing or corrupt.
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty() && self.corrupt.is_empty()
    }
}

/// Merkle tree over a content-addressed store.
///
/// Interior nodes are [`MerkleNodeHeader`] records; every other block is a
/// leaf. Children are followed through references tagged
/// [`MfsType::MERKLE_NODE`]. Tombstoned references are skipped.
#[derive(Debug)]
pub struct MerkleTree<S> {
    store: S,
}

impl<S: ObjectStore> MerkleTree<S> {
    /// Create a tree service over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying block store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume the tree and return its store.
    pub fn into_inner(self) -> S {
        self.store
    }

    /// Store a block and return a reference to it.
    pub fn put_block(&self, tag: MfsType, bytes: &[u8]) -> StoreResult<MerkleNode> {
        let hash = self.store.write(bytes)?;
        debug!(%hash, %tag, len = bytes.len(), "put block");
        Ok(MerkleNode::new(tag, 0, 0, hash))
    }

    /// Encode a record and store it, tagged with its own leading type byte.
    pub fn put_record<R: Encode>(&self, record: &R) -> StoreResult<MerkleNode> {
        let buf = record.encode()?;
        let tag = MfsType(buf.peek_u8()?);
        self.put_block(tag, buf.as_bytes())
    }

    /// Store a directory node and return its hash.
    pub fn put_node(&self, node: &MerkleNodeHeader) -> StoreResult<ContentHash> {
        Ok(self.put_record(node)?.hash)
    }

    /// Fetch a block, failing with `NotFound` if it is absent.
    pub fn get_block(&self, hash: &ContentHash) -> StoreResult<Vec<u8>> {
        self.store.read(hash)?.ok_or(StoreError::NotFound(*hash))
    }

    /// Decode the fixed header of a stored record.
    pub fn get_header(&self, hash: &ContentHash) -> StoreResult<Box<dyn ObjectHeader>> {
        let bytes = self.get_block(hash)?;
        Ok(decode_any(&mut ByteBuffer::from_bytes(&bytes))?)
    }

    /// Fetch and decode a stored directory node, header first and children second.
    pub fn get_node(&self, hash: &ContentHash) -> StoreResult<MerkleNodeHeader> {
        let bytes = self.get_block(hash)?;
        let mut buf = ByteBuffer::from_bytes(&bytes);
        let mut node = MerkleNodeHeader::decode_header(&mut buf)?;
        node.decode_children(&mut buf)?;
        Ok(node)
    }

    /// Depth-first list of every live reference reachable from `root`.
    ///
    /// A subtree shared by several parents is listed under each of them. A
    /// node is never re-entered from inside its own subtree.
    pub fn walk(&self, root: &ContentHash) -> StoreResult<Vec<WalkEntry>> {
        let mut entries = Vec::new();
        // The nodes on the path from the root to the current position.
        let mut path = vec![WalkFrame::open(self, *root)?];
        let mut on_path = HashSet::from([*root]);

        while let Some(frame) = path.last_mut() {
            let Some(child) = frame.children.get(frame.next).copied() else {
                if let Some(done) = path.pop() {
                    on_path.remove(&done.hash);
                }
                continue;
            };
            frame.next += 1;
            let parent = frame.hash;
            entries.push(WalkEntry {
                depth: path.len(),
                parent,
                node: child,
            });
            if child.mfs_type == MfsType::MERKLE_NODE && on_path.insert(child.hash) {
                path.push(WalkFrame::open(self, child.hash)?);
            }
        }
        debug!(%root, references = entries.len(), "walked tree");
        Ok(entries)
    }

    /// Check every block reachable from `root`.
    ///
    /// Problems are collected into the report rather than returned as errors.
    /// Only backend failures other than corruption abort the check.
    pub fn verify(&self, root: &ContentHash) -> StoreResult<VerifyReport> {
        let mut report = VerifyReport::default();
        let mut seen = HashSet::new();
        let mut pending = vec![MerkleNode::new(MfsType::MERKLE_NODE, 0, 0, *root)];

        while let Some(reference) = pending.pop() {
            if !seen.insert(reference.hash) {
                continue;
            }
            let hash = reference.hash;
            let bytes = match self.store.read(&hash) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    warn!(%hash, "referenced block is missing");
                    report.missing.push(hash);
                    continue;
                }
                Err(StoreError::HashMismatch { .. }) => {
                    report.corrupt.push(hash);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !hash.verify(&bytes) {
                warn!(%hash, "block does not match its hash");
                report.corrupt.push(hash);
                continue;
            }

            if reference.mfs_type == MfsType::MERKLE_NODE {
                let mut buf = ByteBuffer::from_bytes(&bytes);
                match MerkleNodeHeader::decode(&mut buf) {
                    Ok(node) => {
                        report.nodes += 1;
                        pending.extend(node.live_children().copied());
                    }
                    Err(e) => {
                        warn!(%hash, error = %e, "node fails to decode");
                        report.corrupt.push(hash);
                    }
                }
            } else {
                report.blocks += 1;
                if !leaf_matches_tag(reference.mfs_type, &bytes) {
                    warn!(%hash, tag = %reference.mfs_type, "block does not carry its referenced tag");
                    report.corrupt.push(hash);
                }
            }
        }
        debug!(
            %root,
            nodes = report.nodes,
            blocks = report.blocks,
            missing = report.missing.len(),
            corrupt = report.corrupt.len(),
            "verified tree"
        );
        Ok(report)
    }
}

/// A node on the walk path and the next live child to visit.
struct WalkFrame {
    hash: ContentHash,
    children: Vec<MerkleNode>,
    next: usize,
}

impl WalkFrame {
    fn open<S: ObjectStore>(tree: &MerkleTree<S>, hash: ContentHash) -> StoreResult<Self> {
        let children = tree.get_node(&hash)?.live_children().copied().collect();
        Ok(Self {
            hash,
            children,
            next: 0,
        })
    }
}

/// A leaf referenced with a registered record tag must decode under that tag.
/// Raw blobs and tags without a decoder are opaque and always match.
fn leaf_matches_tag(tag: MfsType, bytes: &[u8]) -> bool {
    if !builtin_registry().contains(tag) {
        return true;
    }
    let mut buf = ByteBuffer::from_bytes(bytes);
    matches!(decode_any(&mut buf), Ok(header) if header.mfs_type() == tag)
}
