use std::any::Any;

use mfs_buffer::{align_up, ByteBuffer, Packed};
use mfs_types::MfsType;
use tracing::debug;

use crate::error::{FormatError, FormatResult};
use crate::header::{expect_tag, restore_on_error, Encode, ObjectHeader};

/// Length of the fixed symbol table header.
pub const SYMBOL_TABLE_HEADER_LEN: usize = 16;

/// Fixed prefix of every entry: index, reserved and declared length.
pub const SYMBOL_ENTRY_PREFIX_LEN: usize = 8;

/// Fixed part of a symbol table.
///
/// ```text
/// | tag (1) | reserved (3) | entry_no (4) | total_size (8) |
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SymbolTableHeader {
    pub entry_no: u32,
    /// Bytes of all entries, padding included.
    pub total_size: u64,
}

impl SymbolTableHeader {
    /// Create a header for `entry_no` entries spanning `total_size` bytes.
    pub const fn new(entry_no: u32, total_size: u64) -> Self {
        Self {
            entry_no,
            total_size,
        }
    }

    /// Decode the 16-byte fixed header.
    pub fn decode(buf: &mut ByteBuffer) -> FormatResult<Self> {
        restore_on_error(buf, |buf| {
            expect_tag(buf, MfsType::SYMBOL_TABLE)?;
            buf.seek_relative(3)?;
            let entry_no = buf.read_u32()?;
            let total_size = buf.read_u64()?;
            Ok(Self::new(entry_no, total_size))
        })
    }
}

impl Encode for SymbolTableHeader {
    fn encoded_len(&self) -> usize {
        SYMBOL_TABLE_HEADER_LEN
    }

    fn encode_into(&self, buf: &mut ByteBuffer) -> FormatResult<()> {
        buf.pack(&[
            Packed::U8(MfsType::SYMBOL_TABLE.as_u8()),
            Packed::U8(0),
            Packed::U16(0),
            Packed::U32(self.entry_no),
            Packed::U64(self.total_size),
        ])?;
        Ok(())
    }
}

impl ObjectHeader for SymbolTableHeader {
    fn mfs_type(&self) -> MfsType {
        MfsType::SYMBOL_TABLE
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

/// One interned string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolEntry {
    pub index: u16,
    /// Declared byte length on the wire, terminator included.
    pub length: u32,
    pub symbol: String,
}

impl SymbolEntry {
    /// Bytes this entry occupies on the wire, padding included.
    pub fn span(&self) -> usize {
        align_up(SYMBOL_ENTRY_PREFIX_LEN + self.length as usize)
    }

    fn encode_into(&self, buf: &mut ByteBuffer) -> FormatResult<()> {
        buf.pack(&[
            Packed::U16(self.index),
            Packed::U16(0),
            Packed::U32(self.length),
        ])?;
        buf.write(self.symbol.as_bytes())?;
        buf.write_zeros(self.span() - SYMBOL_ENTRY_PREFIX_LEN - self.symbol.len())?;
        Ok(())
    }

    /// Decode one entry, aligning the cursor to a word boundary first.
    fn decode(buf: &mut ByteBuffer) -> FormatResult<Self> {
        buf.align()?;
        let index = buf.read_u16()?;
        buf.read_u16()?;
        let length = buf.read_u32()?;
        let raw = buf.read(length as usize)?;
        let nul = raw.iter().position(|&b| b == 0).ok_or_else(|| {
            FormatError::InvariantViolation(format!(
                "symbol {index} declares {length} bytes with no terminator"
            ))
        })?;
        let symbol = String::from_utf8(raw[..nul].to_vec())
            .map_err(|e| FormatError::InvalidSymbol(e.to_string()))?;
        Ok(Self {
            index,
            length,
            symbol,
        })
    }
}

/// Ordered table of interned strings, indexed from 0.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
    total_size: u64,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table holding `symbols` in order.
    pub fn from_symbols<I, S>(symbols: I) -> FormatResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for symbol in symbols {
            table.add(symbol.as_ref())?;
        }
        Ok(table)
    }

    /// Append a symbol and return its index.
    pub fn add(&mut self, symbol: &str) -> FormatResult<u16> {
        if symbol.as_bytes().contains(&0) {
            return Err(FormatError::InvalidSymbol(format!(
                "{symbol:?} contains a NUL byte"
            )));
        }
        let index = u16::try_from(self.entries.len()).map_err(|_| {
            FormatError::InvariantViolation("symbol table is full".into())
        })?;
        let length = u32::try_from(symbol.len() + 1).map_err(|_| {
            FormatError::InvalidSymbol(format!("symbol of {} bytes is too long", symbol.len()))
        })?;
        self.push(SymbolEntry {
            index,
            length,
            symbol: symbol.to_owned(),
        });
        Ok(index)
    }

    /// Append raw bytes, which must be valid UTF-8.
    pub fn add_bytes(&mut self, symbol: &[u8]) -> FormatResult<u16> {
        let symbol =
            std::str::from_utf8(symbol).map_err(|e| FormatError::InvalidSymbol(e.to_string()))?;
        self.add(symbol)
    }

    fn push(&mut self, entry: SymbolEntry) {
        self.total_size += entry.span() as u64;
        self.entries.push(entry);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table holds no symbols.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes of all entries, padding included.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// The symbol stored at `index`.
    pub fn get(&self, index: u16) -> Option<&str> {
        self.entries
            .get(index as usize)
            .map(|entry| entry.symbol.as_str())
    }

    /// Index of the first entry equal to `symbol`.
    pub fn position(&self, symbol: &str) -> Option<u16> {
        self.entries
            .iter()
            .find(|entry| entry.symbol == symbol)
            .map(|entry| entry.index)
    }

    /// All entries in index order.
    pub fn entries(&self) -> &[SymbolEntry] {
        &self.entries
    }

    /// Iterate over the symbols in index order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.symbol.as_str())
    }

    /// The fixed header describing this table.
    pub fn header(&self) -> SymbolTableHeader {
        SymbolTableHeader::new(self.entries.len() as u32, self.total_size)
    }

    /// Decode `count` entries from a buffer positioned at the first entry.
    ///
    /// An entry whose index skips ahead leaves empty symbols in the gap, so
    /// lookups by index stay positional.
    pub fn decode_entries(buf: &mut ByteBuffer, count: u32) -> FormatResult<Self> {
        restore_on_error(buf, |buf| {
            let mut table = Self::new();
            for _ in 0..count {
                let entry = SymbolEntry::decode(buf)?;
                let expected = table.entries.len();
                if (entry.index as usize) < expected {
                    return Err(FormatError::InvariantViolation(format!(
                        "symbol index {} follows index {}",
                        entry.index,
                        expected.saturating_sub(1)
                    )));
                }
                if entry.index as usize > expected {
                    debug!(from = expected, to = entry.index, "filling symbol index gap");
                }
                for gap in expected..entry.index as usize {
                    table.push(SymbolEntry {
                        index: gap as u16,
                        length: 1,
                        symbol: String::new(),
                    });
                }
                table.push(entry);
            }
            buf.align()?;
            Ok(table)
        })
    }

    /// Decode header and entries from one contiguous buffer.
    pub fn decode(buf: &mut ByteBuffer) -> FormatResult<Self> {
        restore_on_error(buf, |buf| {
            let header = SymbolTableHeader::decode(buf)?;
            let start = buf.offset();
            let table = Self::decode_entries(buf, header.entry_no)?;
            let consumed = (buf.offset() - start) as u64;
            if consumed != header.total_size {
                return Err(FormatError::InvariantViolation(format!(
                    "symbol table declares {} bytes of entries but holds {consumed}",
                    header.total_size
                )));
            }
            Ok(table)
        })
    }
}

impl Encode for SymbolTable {
    fn encoded_len(&self) -> usize {
        SYMBOL_TABLE_HEADER_LEN + self.total_size as usize
    }

    fn encode_into(&self, buf: &mut ByteBuffer) -> FormatResult<()> {
        self.header().encode_into(buf)?;
        for entry in &self.entries {
            entry.encode_into(buf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::decode_any;
    use proptest::prelude::*;
    use std::io::{Seek, SeekFrom};

    #[test]
    fn indices_are_sequential() {
        let mut table = SymbolTable::new();
        assert_eq!(table.add("a").unwrap(), 0);
        assert_eq!(table.add("b").unwrap(), 1);
        assert_eq!(table.add("c").unwrap(), 2);
        assert_eq!(table.get(1), Some("b"));
        assert_eq!(table.position("c"), Some(2));
        assert_eq!(table.get(3), None);
        assert_eq!(table.position("z"), None);
    }

    #[test]
    fn two_step_decode_through_file() {
        let symbols = ["root", "", "time", "lat"];
        let table = SymbolTable::from_symbols(symbols).unwrap();

        let mut file = tempfile::tempfile().unwrap();
        table.encode().unwrap().write_to(&mut file).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut buf = ByteBuffer::from_reader(&mut file, SYMBOL_TABLE_HEADER_LEN).unwrap();
        let header = decode_any(&mut buf)
            .unwrap()
            .downcast::<SymbolTableHeader>()
            .expect("symbol table header");
        assert_eq!(header.entry_no, 4);
        // Every entry here fits in 8 + 8 bytes.
        assert_eq!(header.total_size, 64);

        let mut body = ByteBuffer::from_reader(&mut file, header.total_size as usize).unwrap();
        let decoded = SymbolTable::decode_entries(&mut body, header.entry_no).unwrap();
        assert_eq!(decoded.symbols().collect::<Vec<_>>(), symbols);
        assert_eq!(body.offset(), 64);
        assert_eq!(decoded, table);
    }

    #[test]
    fn entry_span_includes_terminator() {
        let mut table = SymbolTable::new();
        table.add("abcdefgh").unwrap();
        // 8 prefix + 8 text + 1 terminator, padded to 24.
        assert_eq!(table.total_size(), 24);
        assert_eq!(table.entries()[0].length, 9);
        table.add("abcdefg").unwrap();
        assert_eq!(table.total_size(), 24 + 16);
    }

    #[test]
    fn wire_layout() {
        let buf = SymbolTable::from_symbols(["lat"]).unwrap().encode().unwrap();
        let bytes = buf.as_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[..8], &[0x01, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(&bytes[8..16], &16u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &[0, 0, 0, 0, 4, 0, 0, 0]);
        assert_eq!(&bytes[24..32], b"lat\0\0\0\0\0");
    }

    #[test]
    fn one_shot_decode() {
        let table = SymbolTable::from_symbols(["x", "a much longer symbol name", "ü"]).unwrap();
        let mut buf = table.encode().unwrap();
        let decoded = SymbolTable::decode(&mut buf).unwrap();
        assert_eq!(decoded, table);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn empty_table() {
        let table = SymbolTable::new();
        assert!(table.is_empty());
        let mut buf = table.encode().unwrap();
        assert_eq!(buf.capacity(), 16);
        assert_eq!(SymbolTable::decode(&mut buf).unwrap(), table);
    }

    #[test]
    fn nul_in_symbol_is_rejected() {
        let mut table = SymbolTable::new();
        assert!(matches!(
            table.add("ro\0ot"),
            Err(FormatError::InvalidSymbol(_))
        ));
        assert!(table.is_empty());
        assert_eq!(table.total_size(), 0);
    }

    #[test]
    fn non_utf8_bytes_are_rejected() {
        let mut table = SymbolTable::new();
        assert!(matches!(
            table.add_bytes(&[0xff, 0xfe]),
            Err(FormatError::InvalidSymbol(_))
        ));
        assert_eq!(table.add_bytes(b"ok").unwrap(), 0);
    }

    #[test]
    fn missing_terminator_is_rejected() {
        let mut body = ByteBuffer::new(16);
        body.pack(&[Packed::U16(0), Packed::U16(0), Packed::U32(8)])
            .unwrap();
        body.write(b"abcdefgh").unwrap();
        body.seek(0).unwrap();
        assert!(matches!(
            SymbolTable::decode_entries(&mut body, 1),
            Err(FormatError::InvariantViolation(_))
        ));
        assert_eq!(body.offset(), 0);
    }

    #[test]
    fn zero_declared_length_is_rejected() {
        let mut body = ByteBuffer::new(8);
        body.pack(&[Packed::U16(0), Packed::U16(0), Packed::U32(0)])
            .unwrap();
        body.seek(0).unwrap();
        assert!(SymbolTable::decode_entries(&mut body, 1).is_err());
    }

    #[test]
    fn index_gaps_are_filled_with_empty_symbols() {
        let mut body = ByteBuffer::new(16);
        body.pack(&[Packed::U16(2), Packed::U16(0), Packed::U32(2)])
            .unwrap();
        body.write(b"z\0").unwrap();
        body.seek(0).unwrap();
        let table = SymbolTable::decode_entries(&mut body, 1).unwrap();
        assert_eq!(table.symbols().collect::<Vec<_>>(), ["", "", "z"]);
        assert_eq!(table.get(2), Some("z"));
    }

    #[test]
    fn backwards_index_is_rejected() {
        let mut body = ByteBuffer::new(32);
        for _ in 0..2 {
            body.pack(&[Packed::U16(0), Packed::U16(0), Packed::U32(2)])
                .unwrap();
            body.write(b"q\0").unwrap();
            body.align().unwrap();
        }
        body.seek(0).unwrap();
        assert!(matches!(
            SymbolTable::decode_entries(&mut body, 2),
            Err(FormatError::InvariantViolation(_))
        ));
    }

    #[test]
    fn declared_total_size_must_match() {
        let mut buf = SymbolTable::from_symbols(["a", "b"]).unwrap().encode().unwrap();
        buf.seek(8).unwrap();
        buf.pack(&[Packed::U64(8)]).unwrap();
        buf.seek(0).unwrap();
        assert!(matches!(
            SymbolTable::decode(&mut buf),
            Err(FormatError::InvariantViolation(_))
        ));
        assert_eq!(buf.offset(), 0);
    }

    #[test]
    fn wrong_tag_is_rejected() {
        let mut buf = crate::DatatypeHeader::int().encode().unwrap();
        assert!(matches!(
            SymbolTableHeader::decode(&mut buf),
            Err(FormatError::TypeMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn entries_stay_word_aligned(symbols in proptest::collection::vec("[a-z0-9_]{0,40}", 0..12)) {
            let table = SymbolTable::from_symbols(&symbols).unwrap();
            prop_assert_eq!(table.total_size() % 8, 0);

            let mut buf = table.encode().unwrap();
            prop_assert_eq!(buf.capacity() as u64, 16 + table.total_size());
            let decoded = SymbolTable::decode(&mut buf).unwrap();
            let expected: Vec<&str> = symbols.iter().map(String::as_str).collect();
            prop_assert_eq!(decoded.symbols().collect::<Vec<_>>(), expected);
        }
    }
}
