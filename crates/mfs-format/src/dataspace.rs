use std::any::Any;

use mfs_buffer::{ByteBuffer, Packed};
use mfs_types::MfsType;

use crate::error::{FormatError, FormatResult};
use crate::header::{expect_tag, expect_version, restore_on_error, Encode, ObjectHeader};

/// Length of the fixed dataspace header.
pub const DATASPACE_HEADER_LEN: usize = 16;

/// Length of one serialized dimension.
pub const DIMENSION_LEN: usize = 8;

/// Dataspace header version written and accepted.
pub const DATASPACE_VERSION: u8 = 0;

/// Extent of one dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Dimension {
    pub size: u64,
}

impl Dimension {
    /// A dimension of `size` elements.
    pub const fn new(size: u64) -> Self {
        Self { size }
    }

    /// Decode one 8-byte extent.
    pub fn decode(buf: &mut ByteBuffer) -> FormatResult<Self> {
        Ok(Self::new(buf.read_u64()?))
    }
}

impl Encode for Dimension {
    fn encoded_len(&self) -> usize {
        DIMENSION_LEN
    }

    fn encode_into(&self, buf: &mut ByteBuffer) -> FormatResult<()> {
        buf.pack(&[Packed::U64(self.size)])?;
        Ok(())
    }
}

/// Dataspace descriptor: the shape of an array.
///
/// ```text
/// | tag (1) | ver (1) | dims (1) | flags (1) | reserved (4) | total_size (8) |
/// | extent (8) ... one per dimension                                        |
/// ```
///
/// `dims == 0` describes a scalar. `total_size` is always `dims * 8` and is
/// derived from the dimension list rather than stored.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DataspaceHeader {
    flags: u8,
    dimensions: Vec<Dimension>,
}

impl DataspaceHeader {
    /// A scalar (zero-dimensional) dataspace.
    pub fn scalar() -> Self {
        Self::default()
    }

    /// Build from an ordered list of extents.
    pub fn from_shape(shape: &[u64]) -> FormatResult<Self> {
        if shape.len() > u8::MAX as usize {
            return Err(FormatError::InvariantViolation(format!(
                "dataspace rank {} exceeds {}",
                shape.len(),
                u8::MAX
            )));
        }
        Ok(Self {
            flags: 0,
            dimensions: shape.iter().copied().map(Dimension::new).collect(),
        })
    }

    /// `dims` zero-extent placeholders, to be filled by
    /// [`decode_dimensions`](Self::decode_dimensions) or
    /// [`set_dimension`](Self::set_dimension).
    pub fn with_rank(dims: u8) -> Self {
        Self {
            flags: 0,
            dimensions: vec![Dimension::default(); dims as usize],
        }
    }

    /// Replace the flags byte.
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Header format version.
    pub fn version(&self) -> u8 {
        DATASPACE_VERSION
    }

    /// Raw flags byte.
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Number of dimensions.
    pub fn dims(&self) -> u8 {
        self.dimensions.len() as u8
    }

    /// Returns `true` for a zero-dimensional dataspace.
    pub fn is_scalar(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Size in bytes of the extent section.
    pub fn total_size(&self) -> u64 {
        (self.dimensions.len() * DIMENSION_LEN) as u64
    }

    /// Dimensions in order.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Extents in order.
    pub fn shape(&self) -> Vec<u64> {
        self.dimensions.iter().map(|d| d.size).collect()
    }

    /// Set the extent of dimension `index`.
    pub fn set_dimension(&mut self, index: usize, size: u64) -> FormatResult<()> {
        let rank = self.dimensions.len();
        let dim = self.dimensions.get_mut(index).ok_or_else(|| {
            FormatError::InvariantViolation(format!(
                "dimension {index} out of range for rank {rank}"
            ))
        })?;
        dim.size = size;
        Ok(())
    }

    /// Number of elements described: the product of all extents, 1 for a scalar.
    pub fn element_count(&self) -> FormatResult<u64> {
        self.dimensions.iter().try_fold(1u64, |acc, d| {
            acc.checked_mul(d.size).ok_or_else(|| {
                FormatError::InvariantViolation("dataspace element count overflows u64".into())
            })
        })
    }

    /// Decode the 16-byte fixed header. Extents are left as zero placeholders.
    pub fn decode_header(buf: &mut ByteBuffer) -> FormatResult<Self> {
        restore_on_error(buf, |buf| {
            expect_tag(buf, MfsType::DATASPACE)?;
            expect_version(buf, MfsType::DATASPACE, DATASPACE_VERSION)?;
            let dims = buf.read_u8()?;
            let flags = buf.read_u8()?;
            buf.read_u32()?;
            let total_size = buf.read_u64()?;

            let header = Self::with_rank(dims).with_flags(flags);
            if total_size != header.total_size() {
                return Err(FormatError::InvariantViolation(format!(
                    "dataspace declares {dims} dimensions but total_size {total_size}"
                )));
            }
            Ok(header)
        })
    }

    /// Read exactly `dims` extents from a buffer positioned at the variable section.
    pub fn decode_dimensions(&mut self, buf: &mut ByteBuffer) -> FormatResult<()> {
        let dimensions = restore_on_error(buf, |buf| {
            (0..self.dimensions.len())
                .map(|_| Dimension::decode(buf))
                .collect::<FormatResult<Vec<_>>>()
        })?;
        self.dimensions = dimensions;
        Ok(())
    }

    /// Decode header and extents from one contiguous buffer.
    pub fn decode(buf: &mut ByteBuffer) -> FormatResult<Self> {
        restore_on_error(buf, |buf| {
            let mut header = Self::decode_header(buf)?;
            header.decode_dimensions(buf)?;
            Ok(header)
        })
    }
}

impl Encode for DataspaceHeader {
    fn encoded_len(&self) -> usize {
        DATASPACE_HEADER_LEN + self.dimensions.len() * DIMENSION_LEN
    }

    fn encode_into(&self, buf: &mut ByteBuffer) -> FormatResult<()> {
        buf.pack(&[
            Packed::U8(MfsType::DATASPACE.as_u8()),
            Packed::U8(DATASPACE_VERSION),
            Packed::U8(self.dims()),
            Packed::U8(self.flags),
            Packed::U32(0),
            Packed::U64(self.total_size()),
        ])?;
        for dim in &self.dimensions {
            dim.encode_into(buf)?;
        }
        Ok(())
    }
}

impl ObjectHeader for DataspaceHeader {
    fn mfs_type(&self) -> MfsType {
        MfsType::DATASPACE
    }

    fn total_size(&self) -> u64 {
        DataspaceHeader::total_size(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
