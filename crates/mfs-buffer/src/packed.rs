/// A fixed-width little-endian unsigned integer field for [`ByteBuffer::pack`].
///
/// [`ByteBuffer::pack`]: crate::ByteBuffer::pack
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Packed {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
}

impl Packed {
    /// Encoded width in bytes.
    pub const fn width(&self) -> usize {
        match self {
            Self::U8(_) => 1,
            Self::U16(_) => 2,
            Self::U32(_) => 4,
            Self::U64(_) => 8,
        }
    }

    /// Write the little-endian encoding into `out`, which must be exactly `width()` long.
    pub(crate) fn write_le(&self, out: &mut [u8]) {
        match self {
            Self::U8(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::U16(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::U32(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::U64(v) => out.copy_from_slice(&v.to_le_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(Packed::U8(0).width(), 1);
        assert_eq!(Packed::U16(0).width(), 2);
        assert_eq!(Packed::U32(0).width(), 4);
        assert_eq!(Packed::U64(0).width(), 8);
    }

    #[test]
    fn little_endian_layout() {
        let mut out = [0u8; 4];
        Packed::U32(0x0403_0201).write_le(&mut out);
        assert_eq!(out, [1, 2, 3, 4]);
    }
}
