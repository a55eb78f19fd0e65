use std::any::Any;

use mfs_buffer::{align_up, checked_align_up, padding_for, ByteBuffer, Packed, WORD};
use mfs_types::MfsType;

use crate::dataspace::DataspaceHeader;
use crate::datatype::{DatatypeHeader, DATATYPE_LEN};
use crate::error::{FormatError, FormatResult};
use crate::header::{expect_tag, expect_version, restore_on_error, Encode, ObjectHeader};

/// Length of the fixed attribute header.
pub const ATTRIBUTE_HEADER_LEN: usize = 16;

/// Attribute header version written and accepted.
pub const ATTRIBUTE_VERSION: u8 = 0;

/// Fixed part of an attribute record.
///
/// ```text
/// | tag (1) | ver (1) | name_size (2) | datatype_size (2) | dataspace_size (2) | total_size (8) |
/// ```
///
/// `name_size` counts the terminated name padded to a word boundary.
/// `total_size` covers the whole body: name, datatype block, dataspace block
/// and the padded data payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct AttributeHeader {
    pub name_size: u16,
    pub datatype_size: u16,
    pub dataspace_size: u16,
    pub total_size: u64,
}

impl AttributeHeader {
    /// Header format version.
    pub fn version(&self) -> u8 {
        ATTRIBUTE_VERSION
    }

    /// Size of the padded data section implied by the other sections.
    pub fn data_size(&self) -> FormatResult<u64> {
        let fixed =
            self.name_size as u64 + self.datatype_size as u64 + self.dataspace_size as u64;
        self.total_size.checked_sub(fixed).ok_or_else(|| {
            FormatError::InvariantViolation(format!(
                "attribute total_size {} is smaller than its {fixed} header sections",
                self.total_size
            ))
        })
    }

    /// Decode the 16-byte fixed header.
    pub fn decode(buf: &mut ByteBuffer) -> FormatResult<Self> {
        restore_on_error(buf, |buf| {
            expect_tag(buf, MfsType::ATTRIBUTE)?;
            expect_version(buf, MfsType::ATTRIBUTE, ATTRIBUTE_VERSION)?;
            Ok(Self {
                name_size: buf.read_u16()?,
                datatype_size: buf.read_u16()?,
                dataspace_size: buf.read_u16()?,
                total_size: buf.read_u64()?,
            })
        })
    }
}

impl Encode for AttributeHeader {
    fn encoded_len(&self) -> usize {
        ATTRIBUTE_HEADER_LEN
    }

    fn encode_into(&self, buf: &mut ByteBuffer) -> FormatResult<()> {
        buf.pack(&[
            Packed::U8(MfsType::ATTRIBUTE.as_u8()),
            Packed::U8(ATTRIBUTE_VERSION),
            Packed::U16(self.name_size),
            Packed::U16(self.datatype_size),
            Packed::U16(self.dataspace_size),
            Packed::U64(self.total_size),
        ])?;
        Ok(())
    }
}

impl ObjectHeader for AttributeHeader {
    fn mfs_type(&self) -> MfsType {
        MfsType::ATTRIBUTE
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

/// A named, typed, shaped value.
///
/// Construction checks that the payload holds exactly
/// `element_size * element_count` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    datatype: DatatypeHeader,
    dataspace: DataspaceHeader,
    data: Vec<u8>,
}

impl Attribute {
    /// Create an attribute, checking its name and payload size.
    pub fn new(
        name: impl Into<String>,
        datatype: DatatypeHeader,
        dataspace: DataspaceHeader,
        data: Vec<u8>,
    ) -> FormatResult<Self> {
        let name = name.into();
        if name.as_bytes().contains(&0) {
            return Err(FormatError::InvalidSymbol(format!(
                "attribute name {name:?} contains a NUL byte"
            )));
        }
        if align_up(name.len() + 1) > u16::MAX as usize {
            return Err(FormatError::InvalidSymbol(format!(
                "attribute name of {} bytes is too long",
                name.len()
            )));
        }
        check_payload(&datatype, &dataspace, data.len() as u64)?;
        Ok(Self {
            name,
            datatype,
            dataspace,
            data,
        })
    }

    /// Attribute name, without terminator.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element type of the payload.
    pub fn datatype(&self) -> &DatatypeHeader {
        &self.datatype
    }

    /// Shape of the payload.
    pub fn dataspace(&self) -> &DataspaceHeader {
        &self.dataspace
    }

    /// Raw payload, without padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The fixed header this attribute encodes with.
    pub fn header(&self) -> AttributeHeader {
        let name_size = align_up(self.name.len() + 1);
        let dataspace_size = self.dataspace.encoded_len();
        AttributeHeader {
            name_size: name_size as u16,
            datatype_size: DATATYPE_LEN as u16,
            dataspace_size: dataspace_size as u16,
            total_size: (name_size + DATATYPE_LEN + dataspace_size + align_up(self.data.len()))
                as u64,
        }
    }

    /// Decode the body that follows `header`, from a buffer positioned at the name.
    pub fn decode_body(header: &AttributeHeader, buf: &mut ByteBuffer) -> FormatResult<Self> {
        restore_on_error(buf, |buf| {
            let data_size = header.data_size()?;

            if header.name_size == 0 || header.name_size as usize % WORD != 0 {
                return Err(FormatError::InvariantViolation(format!(
                    "attribute name section is {} bytes, not a positive multiple of {WORD}",
                    header.name_size
                )));
            }
            let raw = buf.read(header.name_size as usize)?;
            let nul = raw.iter().position(|&b| b == 0).ok_or_else(|| {
                FormatError::InvariantViolation("attribute name has no terminator".into())
            })?;
            let name = String::from_utf8(raw[..nul].to_vec())
                .map_err(|e| FormatError::InvalidSymbol(e.to_string()))?;

            if header.datatype_size as usize != DATATYPE_LEN {
                return Err(FormatError::InvariantViolation(format!(
                    "attribute datatype block is {} bytes, expected {DATATYPE_LEN}",
                    header.datatype_size
                )));
            }
            let datatype = DatatypeHeader::decode(buf)?;

            let dataspace = DataspaceHeader::decode(buf)?;
            if dataspace.encoded_len() != header.dataspace_size as usize {
                return Err(FormatError::InvariantViolation(format!(
                    "attribute dataspace block is {} bytes but header declares {}",
                    dataspace.encoded_len(),
                    header.dataspace_size
                )));
            }

            let expected = payload_len(&datatype, &dataspace)?;
            let padded = usize::try_from(expected).ok().and_then(checked_align_up);
            if padded.map(|n| n as u64) != Some(data_size) {
                return Err(FormatError::InvariantViolation(format!(
                    "attribute data section is {data_size} bytes, expected {expected} plus padding"
                )));
            }
            let mut data = buf.read(data_size as usize)?;
            data.truncate(expected as usize);

            Ok(Self {
                name,
                datatype,
                dataspace,
                data,
            })
        })
    }

    /// Decode header and body from one contiguous buffer.
    pub fn decode(buf: &mut ByteBuffer) -> FormatResult<Self> {
        restore_on_error(buf, |buf| {
            let header = AttributeHeader::decode(buf)?;
            Self::decode_body(&header, buf)
        })
    }
}

/// Payload length required by a datatype and dataspace pair.
fn payload_len(datatype: &DatatypeHeader, dataspace: &DataspaceHeader) -> FormatResult<u64> {
    dataspace
        .element_count()?
        .checked_mul(datatype.element_size() as u64)
        .ok_or_else(|| FormatError::InvariantViolation("attribute payload size overflows".into()))
}

fn check_payload(
    datatype: &DatatypeHeader,
    dataspace: &DataspaceHeader,
    actual: u64,
) -> FormatResult<()> {
    let expected = payload_len(datatype, dataspace)?;
    if actual != expected {
        return Err(FormatError::InvariantViolation(format!(
            "attribute payload is {actual} bytes, expected {expected}"
        )));
    }
    Ok(())
}

impl Encode for Attribute {
    fn encoded_len(&self) -> usize {
        ATTRIBUTE_HEADER_LEN + self.header().total_size as usize
    }

    fn encode_into(&self, buf: &mut ByteBuffer) -> FormatResult<()> {
        check_payload(&self.datatype, &self.dataspace, self.data.len() as u64)?;
        let header = self.header();
        header.encode_into(buf)?;
        buf.write(self.name.as_bytes())?;
        buf.write_zeros(header.name_size as usize - self.name.len())?;
        self.datatype.encode_into(buf)?;
        self.dataspace.encode_into(buf)?;
        buf.write(&self.data)?;
        buf.write_zeros(padding_for(self.data.len()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::decode_any;
    use std::io::{Seek, SeekFrom};

    fn units() -> Attribute {
        Attribute::new(
            "units",
            DatatypeHeader::ubyte(),
            DataspaceHeader::from_shape(&[3]).unwrap(),
            b"m/s".to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn header_sizes() {
        let header = units().header();
        assert_eq!(header.name_size, 8);
        assert_eq!(header.datatype_size, 16);
        assert_eq!(header.dataspace_size, 24);
        assert_eq!(header.total_size, 8 + 16 + 24 + 8);
        assert_eq!(header.data_size().unwrap(), 8);
    }

    #[test]
    fn two_step_decode_through_file() {
        let values: Vec<u8> = [1.5f64, -2.0, 1e9, 0.25]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let attr = Attribute::new(
            "valid_range",
            DatatypeHeader::double(),
            DataspaceHeader::from_shape(&[2, 2]).unwrap(),
            values,
        )
        .unwrap();

        let mut file = tempfile::tempfile().unwrap();
        attr.encode().unwrap().write_to(&mut file).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut buf = ByteBuffer::from_reader(&mut file, ATTRIBUTE_HEADER_LEN).unwrap();
        let header = decode_any(&mut buf)
            .unwrap()
            .downcast::<AttributeHeader>()
            .expect("attribute header");
        assert_eq!(header.total_size, attr.header().total_size);

        let mut body = ByteBuffer::from_reader(&mut file, header.total_size as usize).unwrap();
        let decoded = Attribute::decode_body(&header, &mut body).unwrap();
        assert_eq!(decoded, attr);
        assert_eq!(decoded.name(), "valid_range");
        assert_eq!(decoded.dataspace().shape(), vec![2, 2]);
        assert_eq!(body.remaining(), 0);
    }

    #[test]
    fn one_shot_decode_strips_padding() {
        let attr = units();
        let mut buf = attr.encode().unwrap();
        assert_eq!(buf.capacity(), 16 + 56);
        let decoded = Attribute::decode(&mut buf).unwrap();
        assert_eq!(decoded.data(), b"m/s");
    }

    #[test]
    fn scalar_attribute() {
        let attr = Attribute::new(
            "count",
            DatatypeHeader::int64(),
            DataspaceHeader::scalar(),
            (-7i64).to_le_bytes().to_vec(),
        )
        .unwrap();
        let mut buf = attr.encode().unwrap();
        assert_eq!(Attribute::decode(&mut buf).unwrap(), attr);
    }

    #[test]
    fn payload_size_is_validated_at_construction() {
        let err = Attribute::new(
            "bad",
            DatatypeHeader::int(),
            DataspaceHeader::from_shape(&[4]).unwrap(),
            vec![0; 15],
        )
        .unwrap_err();
        assert!(matches!(err, FormatError::InvariantViolation(_)));
    }

    #[test]
    fn payload_size_is_validated_at_decode() {
        let mut buf = units().encode().unwrap();
        // Rewrite the dataspace extent from 3 to 9 elements.
        buf.seek(16 + 8 + 16 + 16).unwrap();
        buf.pack(&[Packed::U64(9)]).unwrap();
        buf.seek(0).unwrap();
        assert!(matches!(
            Attribute::decode(&mut buf),
            Err(FormatError::InvariantViolation(_))
        ));
        assert_eq!(buf.offset(), 0);
    }

    /// Header plus a one-byte name, a datatype and a dataspace, with no data section.
    fn record_without_data(datatype: DatatypeHeader, dataspace: DataspaceHeader) -> ByteBuffer {
        let header = AttributeHeader {
            name_size: 8,
            datatype_size: DATATYPE_LEN as u16,
            dataspace_size: dataspace.encoded_len() as u16,
            total_size: (8 + DATATYPE_LEN + dataspace.encoded_len()) as u64,
        };
        let mut buf = ByteBuffer::new(ATTRIBUTE_HEADER_LEN + header.total_size as usize);
        header.encode_into(&mut buf).unwrap();
        buf.write(b"a").unwrap();
        buf.write_zeros(7).unwrap();
        datatype.encode_into(&mut buf).unwrap();
        dataspace.encode_into(&mut buf).unwrap();
        buf.seek(0).unwrap();
        buf
    }

    #[test]
    fn overflowing_element_count_is_rejected_at_decode() {
        let mut buf = record_without_data(
            DatatypeHeader::ubyte(),
            DataspaceHeader::from_shape(&[u64::MAX]).unwrap(),
        );
        assert!(matches!(
            Attribute::decode(&mut buf),
            Err(FormatError::InvariantViolation(_))
        ));
        assert_eq!(buf.offset(), 0);

        let mut buf = record_without_data(
            DatatypeHeader::double(),
            DataspaceHeader::from_shape(&[u64::MAX / 4]).unwrap(),
        );
        assert!(matches!(
            Attribute::decode(&mut buf),
            Err(FormatError::InvariantViolation(_))
        ));
    }

    #[test]
    fn empty_data_section_matches_zero_elements() {
        let mut buf = record_without_data(
            DatatypeHeader::int(),
            DataspaceHeader::from_shape(&[0]).unwrap(),
        );
        let decoded = Attribute::decode(&mut buf).unwrap();
        assert_eq!(decoded.name(), "a");
        assert!(decoded.data().is_empty());
    }

    #[test]
    fn oversized_name_section_reports_overflow() {
        let header = AttributeHeader {
            name_size: 0xfff8,
            datatype_size: 16,
            dataspace_size: 16,
            total_size: u64::MAX,
        };
        let mut body = ByteBuffer::new(64);
        assert!(matches!(
            Attribute::decode_body(&header, &mut body),
            Err(FormatError::Buffer(_))
        ));
        assert_eq!(body.offset(), 0);
    }

    #[test]
    fn unaligned_name_section_is_rejected() {
        let attr = units();
        let mut buf = attr.encode().unwrap();
        buf.seek(ATTRIBUTE_HEADER_LEN).unwrap();
        for name_size in [0, 3, 12] {
            let header = AttributeHeader {
                name_size,
                ..attr.header()
            };
            assert!(matches!(
                Attribute::decode_body(&header, &mut buf),
                Err(FormatError::InvariantViolation(_))
            ));
            assert_eq!(buf.offset(), ATTRIBUTE_HEADER_LEN);
        }
    }

    #[test]
    fn undersized_total_is_rejected() {
        let header = AttributeHeader {
            name_size: 8,
            datatype_size: 16,
            dataspace_size: 16,
            total_size: 8,
        };
        assert!(header.data_size().is_err());
        let mut body = ByteBuffer::new(64);
        assert!(Attribute::decode_body(&header, &mut body).is_err());
    }

    #[test]
    fn bad_datatype_size_is_rejected() {
        let attr = units();
        let mut header = attr.header();
        header.datatype_size = 24;
        header.total_size += 8;
        let mut buf = attr.encode().unwrap();
        buf.seek(ATTRIBUTE_HEADER_LEN).unwrap();
        assert!(matches!(
            Attribute::decode_body(&header, &mut buf),
            Err(FormatError::InvariantViolation(_))
        ));
    }

    #[test]
    fn name_rules() {
        let ds = DataspaceHeader::scalar();
        assert!(matches!(
            Attribute::new("a\0b", DatatypeHeader::ubyte(), ds.clone(), vec![1]),
            Err(FormatError::InvalidSymbol(_))
        ));
        let empty = Attribute::new("", DatatypeHeader::ubyte(), ds, vec![1]).unwrap();
        assert_eq!(empty.header().name_size, 8);
        let mut buf = empty.encode().unwrap();
        assert_eq!(Attribute::decode(&mut buf).unwrap().name(), "");
    }

    #[test]
    fn string_attribute() {
        let title = b"surface temperature";
        let attr = Attribute::new(
            "title",
            DatatypeHeader::string(
                crate::datatype::StringEncoding::Utf8,
                crate::datatype::StringPadding::NullPadded,
            ),
            DataspaceHeader::from_shape(&[title.len() as u64]).unwrap(),
            title.to_vec(),
        )
        .unwrap();
        let mut buf = attr.encode().unwrap();
        let decoded = Attribute::decode(&mut buf).unwrap();
        assert_eq!(decoded.data(), title);
        assert_eq!(decoded.datatype().string_encoding(), attr.datatype().string_encoding());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut buf = units().encode().unwrap();
        buf.seek(1).unwrap();
        buf.pack(&[Packed::U8(1)]).unwrap();
        buf.seek(0).unwrap();
        assert!(matches!(
            AttributeHeader::decode(&mut buf),
            Err(FormatError::UnsupportedVersion { version: 1, .. })
        ));
    }
}
