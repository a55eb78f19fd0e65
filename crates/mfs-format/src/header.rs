use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use mfs_buffer::ByteBuffer;
use mfs_types::MfsType;
use tracing::debug;

use crate::attribute::AttributeHeader;
use crate::dataspace::DataspaceHeader;
use crate::datatype::DatatypeHeader;
use crate::error::{FormatError, FormatResult};
use crate::node::MerkleNodeHeader;
use crate::symbol_table::SymbolTableHeader;

/// Common interface of every fixed-size record header.
///
/// A header is what [`decode_any`] returns: the 16-byte fixed part of a
/// record. Its [`total_size`](ObjectHeader::total_size) tells the caller how
/// many body bytes follow, so the body can be fetched from storage and
/// decoded in a second step.
pub trait ObjectHeader: Any + fmt::Debug + Send + Sync {
    /// The record's type tag.
    fn mfs_type(&self) -> MfsType;

    /// Size in bytes of the variable-length body following the fixed header.
    fn total_size(&self) -> u64;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl dyn ObjectHeader {
    /// Returns `true` if the concrete header type is `T`.
    pub fn is<T: ObjectHeader>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrow the concrete header, if it is a `T`.
    pub fn downcast_ref<T: ObjectHeader>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Take ownership of the concrete header, if it is a `T`.
    pub fn downcast<T: ObjectHeader>(self: Box<Self>) -> Option<Box<T>> {
        self.into_any().downcast::<T>().ok()
    }
}

/// Serialization into a [`ByteBuffer`].
pub trait Encode {
    /// Exact serialized length in bytes (a multiple of 8 for every record).
    fn encoded_len(&self) -> usize;

    /// Write the serialized record at the buffer's cursor.
    fn encode_into(&self, buf: &mut ByteBuffer) -> FormatResult<()>;

    /// Serialize into a fresh buffer sized to the record, cursor rewound to 0.
    fn encode(&self) -> FormatResult<ByteBuffer> {
        let mut buf = ByteBuffer::new(self.encoded_len());
        self.encode_into(&mut buf)?;
        buf.seek(0)?;
        Ok(buf)
    }
}

/// Decoder for one record type, starting at the record's first byte.
pub type HeaderDecoder = fn(&mut ByteBuffer) -> FormatResult<Box<dyn ObjectHeader>>;

/// Open mapping from type tag to header decoder.
///
/// New record types are added with [`register`](HeaderRegistry::register);
/// existing decoders and the dispatch site stay untouched.
#[derive(Clone, Debug, Default)]
pub struct HeaderRegistry {
    decoders: HashMap<u8, HeaderDecoder>,
}

impl HeaderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with decoders for every core record type.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(MfsType::DATATYPE, decode_datatype);
        registry.register(MfsType::DATASPACE, decode_dataspace);
        registry.register(MfsType::SYMBOL_TABLE, decode_symbol_table);
        registry.register(MfsType::ATTRIBUTE, decode_attribute);
        registry.register(MfsType::MERKLE_NODE, decode_merkle_node);
        registry
    }

    /// Register `decoder` for `tag`, returning the decoder it replaces.
    pub fn register(&mut self, tag: MfsType, decoder: HeaderDecoder) -> Option<HeaderDecoder> {
        self.decoders.insert(tag.as_u8(), decoder)
    }

    /// Returns `true` if a decoder is registered for `tag`.
    pub fn contains(&self, tag: MfsType) -> bool {
        self.decoders.contains_key(&tag.as_u8())
    }

    /// Registered tags in ascending order.
    pub fn tags(&self) -> Vec<MfsType> {
        let mut tags: Vec<MfsType> = self.decoders.keys().copied().map(MfsType).collect();
        tags.sort();
        tags
    }

    /// Peek the tag at the cursor and decode the header it selects.
    ///
    /// The decoder starts from the original offset. On failure the cursor is
    /// restored, so the buffer is left as it was found.
    pub fn decode_any(&self, buf: &mut ByteBuffer) -> FormatResult<Box<dyn ObjectHeader>> {
        let tag = buf.peek_u8()?;
        let decoder = self
            .decoders
            .get(&tag)
            .ok_or(FormatError::UnrecognizedType(tag))?;
        debug!(tag = %MfsType(tag), offset = buf.offset(), "dispatching header decode");
        restore_on_error(buf, |buf| decoder(buf))
    }
}

/// The process-wide registry of core decoders, built on first use.
pub fn builtin_registry() -> &'static HeaderRegistry {
    static REGISTRY: OnceLock<HeaderRegistry> = OnceLock::new();
    REGISTRY.get_or_init(HeaderRegistry::builtin)
}

/// Decode whichever core header starts at the cursor.
pub fn decode_any(buf: &mut ByteBuffer) -> FormatResult<Box<dyn ObjectHeader>> {
    builtin_registry().decode_any(buf)
}

/// Run `f`, rewinding the cursor to where it started if `f` fails.
pub(crate) fn restore_on_error<T>(
    buf: &mut ByteBuffer,
    f: impl FnOnce(&mut ByteBuffer) -> FormatResult<T>,
) -> FormatResult<T> {
    let start = buf.offset();
    let result = f(buf);
    if result.is_err() {
        buf.seek(start)?;
    }
    result
}

/// Consume the tag byte and check it against `expected`.
pub(crate) fn expect_tag(buf: &mut ByteBuffer, expected: MfsType) -> FormatResult<()> {
    let actual = MfsType(buf.read_u8()?);
    if actual != expected {
        return Err(FormatError::TypeMismatch { expected, actual });
    }
    Ok(())
}

/// Consume the version byte and check it against `supported`.
pub(crate) fn expect_version(buf: &mut ByteBuffer, kind: MfsType, supported: u8) -> FormatResult<u8> {
    let version = buf.read_u8()?;
    if version != supported {
        return Err(FormatError::UnsupportedVersion { kind, version });
    }
    Ok(version)
}

fn decode_datatype(buf: &mut ByteBuffer) -> FormatResult<Box<dyn ObjectHeader>> {
    Ok(Box::new(DatatypeHeader::decode(buf)?))
}

fn decode_dataspace(buf: &mut ByteBuffer) -> FormatResult<Box<dyn ObjectHeader>> {
    Ok(Box::new(DataspaceHeader::decode_header(buf)?))
}

fn decode_symbol_table(buf: &mut ByteBuffer) -> FormatResult<Box<dyn ObjectHeader>> {
    Ok(Box::new(SymbolTableHeader::decode(buf)?))
}

fn decode_attribute(buf: &mut ByteBuffer) -> FormatResult<Box<dyn ObjectHeader>> {
    Ok(Box::new(AttributeHeader::decode(buf)?))
}

fn decode_merkle_node(buf: &mut ByteBuffer) -> FormatResult<Box<dyn ObjectHeader>> {
    Ok(Box::new(MerkleNodeHeader::decode_header(buf)?))
}
