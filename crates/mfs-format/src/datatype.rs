use std::any::Any;

use mfs_buffer::{ByteBuffer, Packed};
use mfs_types::MfsType;

use crate::error::FormatResult;
use crate::header::{expect_tag, restore_on_error, Encode, ObjectHeader};

/// Serialized length of a datatype descriptor.
pub const DATATYPE_LEN: usize = 16;

/// Flag bit marking a signed integer kind.
pub const FLAG_SIGNED: u16 = 0x01;

/// Catalogue of primitive element kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DatatypeClass {
    UByte = 0x00,
    Byte = 0x01,
    UShort = 0x02,
    Short = 0x03,
    UInt = 0x04,
    Int = 0x05,
    UInt64 = 0x06,
    Int64 = 0x07,
    Float32 = 0x08,
    Double = 0x09,
    /// Fixed-length string.
    String = 0x10,
}

impl DatatypeClass {
    /// Raw class code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Class for a raw code, if known.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::UByte),
            0x01 => Some(Self::Byte),
            0x02 => Some(Self::UShort),
            0x03 => Some(Self::Short),
            0x04 => Some(Self::UInt),
            0x05 => Some(Self::Int),
            0x06 => Some(Self::UInt64),
            0x07 => Some(Self::Int64),
            0x08 => Some(Self::Float32),
            0x09 => Some(Self::Double),
            0x10 => Some(Self::String),
            _ => None,
        }
    }
}

/// Character encoding of a fixed-length string (high nibble of the flags byte).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum StringEncoding {
    #[default]
    Ascii = 0x00,
    Utf8 = 0x01,
}

impl StringEncoding {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(Self::Ascii),
            0x01 => Some(Self::Utf8),
            _ => None,
        }
    }
}

/// Padding of a fixed-length string (low nibble of the flags byte).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum StringPadding {
    #[default]
    NullTerminated = 0x00,
    NullPadded = 0x01,
    SpacePadded = 0x02,
}

impl StringPadding {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(Self::NullTerminated),
            0x01 => Some(Self::NullPadded),
            0x02 => Some(Self::SpacePadded),
            _ => None,
        }
    }
}

/// Datatype descriptor: the kind, flags and byte size of one element.
///
/// ```text
/// | tag (1) | code (1) | flags (2) | size (4) | total_size (8) |
/// ```
///
/// `total_size` is reserved for variable-length payloads and is 0 for every
/// scalar kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DatatypeHeader {
    code: u8,
    flags: u16,
    size: u32,
    total_size: u64,
}

impl DatatypeHeader {
    /// Create a descriptor from raw fields.
    pub const fn new(code: u8, flags: u16, size: u32, total_size: u64) -> Self {
        Self {
            code,
            flags,
            size,
            total_size,
        }
    }

    const fn preset(class: DatatypeClass, flags: u16, size: u32) -> Self {
        Self::new(class.code(), flags, size, 0)
    }

    /// Unsigned 8-bit integer.
    pub const fn ubyte() -> Self {
        Self::preset(DatatypeClass::UByte, 0, 1)
    }

    /// Signed 8-bit integer.
    pub const fn byte() -> Self {
        Self::preset(DatatypeClass::Byte, FLAG_SIGNED, 1)
    }

    /// Unsigned 16-bit integer.
    pub const fn ushort() -> Self {
        Self::preset(DatatypeClass::UShort, 0, 2)
    }

    /// Signed 16-bit integer.
    pub const fn short() -> Self {
        Self::preset(DatatypeClass::Short, FLAG_SIGNED, 2)
    }

    /// Unsigned 32-bit integer.
    pub const fn uint() -> Self {
        Self::preset(DatatypeClass::UInt, 0, 4)
    }

    /// Signed 32-bit integer.
    pub const fn int() -> Self {
        Self::preset(DatatypeClass::Int, FLAG_SIGNED, 4)
    }

    /// Unsigned 64-bit integer.
    pub const fn uint64() -> Self {
        Self::preset(DatatypeClass::UInt64, 0, 8)
    }

    /// Signed 64-bit integer.
    pub const fn int64() -> Self {
        Self::preset(DatatypeClass::Int64, FLAG_SIGNED, 8)
    }

    /// Little-endian IEEE 754 single precision.
    pub const fn float32() -> Self {
        Self::preset(DatatypeClass::Float32, 0, 4)
    }

    /// Little-endian IEEE 754 double precision.
    pub const fn double() -> Self {
        Self::preset(DatatypeClass::Double, 0, 8)
    }

    /// Fixed-length string of single-byte units.
    pub const fn string(encoding: StringEncoding, padding: StringPadding) -> Self {
        let flags = ((encoding as u16) << 4) | padding as u16;
        Self::preset(DatatypeClass::String, flags, 1)
    }

    /// Raw class code byte.
    pub fn code(&self) -> u8 {
        self.code
    }

    /// Decoded class, or `None` for an unknown code.
    pub fn class(&self) -> Option<DatatypeClass> {
        DatatypeClass::from_code(self.code)
    }

    /// Raw class flags.
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Size of one element in bytes.
    pub fn element_size(&self) -> u32 {
        self.size
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Returns `true` if the signed flag is set.
    pub fn is_signed(&self) -> bool {
        self.class() != Some(DatatypeClass::String) && self.flags & FLAG_SIGNED != 0
    }

    /// Encoding selector, for string kinds only.
    pub fn string_encoding(&self) -> Option<StringEncoding> {
        match self.class() {
            Some(DatatypeClass::String) => StringEncoding::from_bits(((self.flags >> 4) & 0x0f) as u8),
            _ => None,
        }
    }

    /// Padding selector, for string kinds only.
    pub fn string_padding(&self) -> Option<StringPadding> {
        match self.class() {
            Some(DatatypeClass::String) => StringPadding::from_bits((self.flags & 0x0f) as u8),
            _ => None,
        }
    }

    /// Decode a descriptor starting at the cursor.
    pub fn decode(buf: &mut ByteBuffer) -> FormatResult<Self> {
        restore_on_error(buf, |buf| {
            expect_tag(buf, MfsType::DATATYPE)?;
            let code = buf.read_u8()?;
            let flags = buf.read_u16()?;
            let size = buf.read_u32()?;
            let total_size = buf.read_u64()?;
            Ok(Self::new(code, flags, size, total_size))
        })
    }
}

impl Encode for DatatypeHeader {
    fn encoded_len(&self) -> usize {
        DATATYPE_LEN
    }

    fn encode_into(&self, buf: &mut ByteBuffer) -> FormatResult<()> {
        buf.pack(&[
            Packed::U8(MfsType::DATATYPE.as_u8()),
            Packed::U8(self.code),
            Packed::U16(self.flags),
            Packed::U32(self.size),
            Packed::U64(self.total_size),
        ])?;
        Ok(())
    }
}

impl ObjectHeader for DatatypeHeader {
    fn mfs_type(&self) -> MfsType {
        MfsType::DATATYPE
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
