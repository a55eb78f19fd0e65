use std::any::Any;

use mfs_buffer::{ByteBuffer, Packed};
use mfs_types::{ContentHash, MfsType, HASH_LEN};

use crate::error::{FormatError, FormatResult};
use crate::header::{expect_tag, expect_version, restore_on_error, Encode, ObjectHeader};

/// Magic bytes identifying a Merkle node header.
pub const MERKLE_SIGNATURE: [u8; 4] = *b".MFS";

/// Length of the fixed Merkle node header.
pub const MERKLE_HEADER_LEN: usize = 16;

/// Length of one serialized child reference.
pub const MERKLE_NODE_LEN: usize = 24;

/// Merkle node header version written and accepted.
pub const MERKLE_VERSION: u8 = 0;

/// Reference from a directory to a block, by content hash.
///
/// ```text
/// | tag (1) | mode (1) | flags (2) | sha1 (20) |
/// ```
///
/// `mfs_type` is the tag of the referenced block, or [`MfsType::NIL`] once
/// the reference has been deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MerkleNode {
    pub mfs_type: MfsType,
    pub mode: u8,
    pub flags: u16,
    pub hash: ContentHash,
}

impl MerkleNode {
    /// Create a child reference.
    pub const fn new(mfs_type: MfsType, mode: u8, flags: u16, hash: ContentHash) -> Self {
        Self {
            mfs_type,
            mode,
            flags,
            hash,
        }
    }

    /// Reference to `block`, hashed on the spot.
    pub fn for_block(mfs_type: MfsType, block: &[u8]) -> Self {
        Self::new(mfs_type, 0, 0, ContentHash::digest(block))
    }

    /// Returns `true` once the reference has been deleted.
    pub fn is_tombstone(&self) -> bool {
        self.mfs_type.is_nil()
    }

    /// Decode one 24-byte child reference.
    pub fn decode(buf: &mut ByteBuffer) -> FormatResult<Self> {
        restore_on_error(buf, |buf| {
            let mfs_type = MfsType(buf.read_u8()?);
            let mode = buf.read_u8()?;
            let flags = buf.read_u16()?;
            let hash = ContentHash::from_hash(buf.read_array::<HASH_LEN>()?);
            Ok(Self::new(mfs_type, mode, flags, hash))
        })
    }
}

impl Encode for MerkleNode {
    fn encoded_len(&self) -> usize {
        MERKLE_NODE_LEN
    }

    fn encode_into(&self, buf: &mut ByteBuffer) -> FormatResult<()> {
        buf.pack(&[
            Packed::U8(self.mfs_type.as_u8()),
            Packed::U8(self.mode),
            Packed::U16(self.flags),
        ])?;
        buf.write(self.hash.as_bytes())?;
        Ok(())
    }
}

/// Directory of child references: the interior node of the Merkle tree.
///
/// ```text
/// | tag (1) | ver (1) | children (2) | ".MFS" (4) | total_size (8) |
/// | child (24) ... in insertion order                              |
/// ```
///
/// Deleted children stay in place as tombstones and keep counting towards
/// `children` and `total_size` until [`compact`](Self::compact) is called.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MerkleNodeHeader {
    children: u16,
    total_size: u64,
    objects: Vec<MerkleNode>,
}

impl MerkleNodeHeader {
    /// Create an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Header format version.
    pub fn version(&self) -> u8 {
        MERKLE_VERSION
    }

    /// Declared child count, tombstones included.
    pub fn children(&self) -> u16 {
        self.children
    }

    /// Bytes of serialized children.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Decoded or added children, tombstones included.
    pub fn objects(&self) -> &[MerkleNode] {
        &self.objects
    }

    /// Children that have not been tombstoned, in insertion order.
    pub fn live_children(&self) -> impl Iterator<Item = &MerkleNode> {
        self.objects.iter().filter(|child| !child.is_tombstone())
    }

    /// Append a child reference, growing `children` and `total_size`.
    pub fn add_child(&mut self, child: MerkleNode) -> FormatResult<()> {
        let children = self.children.checked_add(1).ok_or_else(|| {
            FormatError::InvariantViolation(format!("node already holds {} children", u16::MAX))
        })?;
        self.children = children;
        self.total_size += MERKLE_NODE_LEN as u64;
        self.objects.push(child);
        Ok(())
    }

    /// Tombstone the first live child referencing `hash`.
    ///
    /// Returns `false` if no live child matched.
    pub fn delete_child(&mut self, hash: &ContentHash) -> bool {
        match self
            .objects
            .iter_mut()
            .find(|child| !child.is_tombstone() && child.hash == *hash)
        {
            Some(child) => {
                child.mfs_type = MfsType::NIL;
                true
            }
            None => false,
        }
    }

    /// Drop tombstones and recompute the count and size.
    pub fn compact(&mut self) {
        self.objects.retain(|child| !child.is_tombstone());
        self.children = self.objects.len() as u16;
        self.total_size = (self.objects.len() * MERKLE_NODE_LEN) as u64;
    }

    /// Decode the 16-byte fixed header. Children are read separately with
    /// [`decode_children`](Self::decode_children).
    pub fn decode_header(buf: &mut ByteBuffer) -> FormatResult<Self> {
        restore_on_error(buf, |buf| {
            expect_tag(buf, MfsType::MERKLE_NODE)?;
            expect_version(buf, MfsType::MERKLE_NODE, MERKLE_VERSION)?;
            let children = buf.read_u16()?;
            let signature = buf.read_array::<4>()?;
            if signature != MERKLE_SIGNATURE {
                return Err(FormatError::SignatureMismatch {
                    expected: MERKLE_SIGNATURE,
                    actual: signature,
                });
            }
            let total_size = buf.read_u64()?;
            if total_size != children as u64 * MERKLE_NODE_LEN as u64 {
                return Err(FormatError::InvariantViolation(format!(
                    "node declares {children} children but total_size {total_size}"
                )));
            }
            Ok(Self {
                children,
                total_size,
                objects: Vec::with_capacity(children as usize),
            })
        })
    }

    /// Read exactly `children` references from a buffer positioned at the first one.
    pub fn decode_children(&mut self, buf: &mut ByteBuffer) -> FormatResult<()> {
        let objects = restore_on_error(buf, |buf| {
            (0..self.children)
                .map(|_| MerkleNode::decode(buf))
                .collect::<FormatResult<Vec<_>>>()
        })?;
        self.objects = objects;
        Ok(())
    }

    /// Decode header and children from one contiguous buffer.
    pub fn decode(buf: &mut ByteBuffer) -> FormatResult<Self> {
        restore_on_error(buf, |buf| {
            let mut header = Self::decode_header(buf)?;
            header.decode_children(buf)?;
            Ok(header)
        })
    }
}

impl Encode for MerkleNodeHeader {
    fn encoded_len(&self) -> usize {
        MERKLE_HEADER_LEN + self.total_size as usize
    }

    fn encode_into(&self, buf: &mut ByteBuffer) -> FormatResult<()> {
        if self.children as usize != self.objects.len() {
            return Err(FormatError::InvariantViolation(format!(
                "node declares {} children but holds {}",
                self.children,
                self.objects.len()
            )));
        }
        buf.pack(&[
            Packed::U8(MfsType::MERKLE_NODE.as_u8()),
            Packed::U8(MERKLE_VERSION),
            Packed::U16(self.children),
        ])?;
        buf.write(&MERKLE_SIGNATURE)?;
        buf.pack(&[Packed::U64(self.total_size)])?;
        for child in &self.objects {
            child.encode_into(buf)?;
        }
        Ok(())
    }
}

impl ObjectHeader for MerkleNodeHeader {
    fn mfs_type(&self) -> MfsType {
        MfsType::MERKLE_NODE
    }

    fn total_size(&self) -> u64 {
        self.total_size
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::decode_any;
    use std::io::{Seek, SeekFrom};

    fn sample() -> MerkleNode {
        MerkleNode::new(
            MfsType::DATATYPE,
            0,
            0,
            ContentHash::digest(b"sample text"),
        )
    }

    #[test]
    fn known_sample_hash() {
        assert_eq!(
            sample().hash.to_hex(),
            "86f441fa0e99f2a36784217a323cea1f5fc0b7f6"
        );
    }

    #[test]
    fn five_children_through_file() {
        let mut node = MerkleNodeHeader::new();
        for _ in 0..5 {
            node.add_child(sample()).unwrap();
        }
        assert_eq!(node.children(), 5);
        assert_eq!(node.total_size(), 120);

        let mut file = tempfile::tempfile().unwrap();
        node.encode().unwrap().write_to(&mut file).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut buf = ByteBuffer::from_reader(&mut file, MERKLE_HEADER_LEN).unwrap();
        let mut header = decode_any(&mut buf)
            .unwrap()
            .downcast::<MerkleNodeHeader>()
            .expect("merkle node header");
        assert_eq!(header.version(), 0);
        assert_eq!(header.children(), 5);
        assert_eq!(header.total_size(), 120);
        assert!(header.objects().is_empty());

        let mut body = ByteBuffer::from_reader(&mut file, header.total_size() as usize).unwrap();
        header.decode_children(&mut body).unwrap();
        assert_eq!(header.objects().len(), 5);
        for child in header.objects() {
            assert_eq!(*child, sample());
        }
        assert_eq!(*header, node);
    }

    #[test]
    fn wire_layout() {
        let mut node = MerkleNodeHeader::new();
        node.add_child(MerkleNode::new(MfsType::BLOB, 7, 0x0201, ContentHash::null()))
            .unwrap();
        let buf = node.encode().unwrap();
        let bytes = buf.as_bytes();
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[..4], &[0x02, 0x00, 0x01, 0x00]);
        assert_eq!(&bytes[4..8], b".MFS");
        assert_eq!(&bytes[8..16], &24u64.to_le_bytes());
        assert_eq!(&bytes[16..20], &[0x06, 7, 0x01, 0x02]);
        assert_eq!(&bytes[20..40], &[0u8; 20]);
    }

    #[test]
    fn child_reference_is_24_bytes() {
        let mut buf = sample().encode().unwrap();
        assert_eq!(buf.capacity(), 24);
        assert_eq!(MerkleNode::decode(&mut buf).unwrap(), sample());
        assert_eq!(buf.offset(), 24);
    }

    #[test]
    fn for_block_hashes_content() {
        let node = MerkleNode::for_block(MfsType::BLOB, b"Hello World");
        assert_eq!(node.hash.to_hex(), "0a4d55a8d778e5022fab701977c5d840bbc486d0");
        assert_eq!(node.mode, 0);
        assert_eq!(node.flags, 0);
    }

    #[test]
    fn delete_tombstones_first_live_match() {
        let other = MerkleNode::for_block(MfsType::BLOB, b"other");
        let mut node = MerkleNodeHeader::new();
        node.add_child(sample()).unwrap();
        node.add_child(other).unwrap();
        node.add_child(sample()).unwrap();

        assert!(node.delete_child(&sample().hash));
        assert_eq!(node.objects()[0].mfs_type, MfsType::NIL);
        assert_eq!(node.objects()[2].mfs_type, MfsType::DATATYPE);
        assert_eq!(node.children(), 3);
        assert_eq!(node.total_size(), 72);
        assert_eq!(node.live_children().count(), 2);

        assert!(node.delete_child(&sample().hash));
        assert!(!node.delete_child(&sample().hash));
        assert!(!node.delete_child(&ContentHash::digest(b"absent")));
        assert_eq!(node.live_children().collect::<Vec<_>>(), vec![&other]);
    }

    #[test]
    fn tombstones_survive_encoding() {
        let mut node = MerkleNodeHeader::new();
        node.add_child(sample()).unwrap();
        node.delete_child(&sample().hash);
        let mut buf = node.encode().unwrap();
        let decoded = MerkleNodeHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded.children(), 1);
        assert!(decoded.objects()[0].is_tombstone());
        assert_eq!(decoded.live_children().count(), 0);
    }

    #[test]
    fn compact_drops_tombstones() {
        let mut node = MerkleNodeHeader::new();
        for i in 0..4u8 {
            node.add_child(MerkleNode::for_block(MfsType::BLOB, &[i]))
                .unwrap();
        }
        node.delete_child(&ContentHash::digest(&[1]));
        node.delete_child(&ContentHash::digest(&[3]));
        node.compact();
        assert_eq!(node.children(), 2);
        assert_eq!(node.total_size(), 48);
        assert_eq!(node.encode().unwrap().capacity(), 16 + 48);
    }

    #[test]
    fn child_limit() {
        let mut node = MerkleNodeHeader::new();
        for _ in 0..u16::MAX {
            node.add_child(sample()).unwrap();
        }
        assert!(matches!(
            node.add_child(sample()),
            Err(FormatError::InvariantViolation(_))
        ));
        assert_eq!(node.children(), u16::MAX);
    }

    #[test]
    fn corrupted_signature() {
        let mut buf = MerkleNodeHeader::new().encode().unwrap();
        buf.seek(4).unwrap();
        buf.write(b"XMFS").unwrap();
        buf.seek(0).unwrap();
        let err = MerkleNodeHeader::decode_header(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            FormatError::SignatureMismatch {
                expected: MERKLE_SIGNATURE,
                actual: [b'X', b'M', b'F', b'S']
            }
        ));
        assert_eq!(buf.offset(), 0);
    }

    #[test]
    fn inconsistent_total_size() {
        let mut buf = MerkleNodeHeader::new().encode().unwrap();
        buf.seek(8).unwrap();
        buf.pack(&[Packed::U64(24)]).unwrap();
        buf.seek(0).unwrap();
        assert!(matches!(
            MerkleNodeHeader::decode_header(&mut buf),
            Err(FormatError::InvariantViolation(_))
        ));
    }

    #[test]
    fn header_without_children_cannot_be_reencoded() {
        let mut node = MerkleNodeHeader::new();
        node.add_child(sample()).unwrap();
        let mut buf = node.encode().unwrap();
        let header = MerkleNodeHeader::decode_header(&mut buf).unwrap();
        assert!(matches!(
            header.encode(),
            Err(FormatError::InvariantViolation(_))
        ));
    }

    #[test]
    fn truncated_children_are_rejected() {
        let mut node = MerkleNodeHeader::new();
        node.add_child(sample()).unwrap();
        node.add_child(sample()).unwrap();
        let full = node.encode().unwrap();
        let mut header = MerkleNodeHeader::decode_header(&mut full.clone()).unwrap();

        let mut short = ByteBuffer::from_bytes(&full.as_bytes()[16..40]);
        assert!(header.decode_children(&mut short).is_err());
        assert!(header.objects().is_empty());
        assert_eq!(short.offset(), 0);
    }
}
