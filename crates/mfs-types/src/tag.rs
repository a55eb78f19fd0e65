use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Record type tag: the first byte of every serialized MFS object.
///
/// This is an open set. The well-known tags below cover the core record
/// types; other crates may define and register their own values.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MfsType(pub u8);

impl MfsType {
    /// Tombstoned child reference.
    pub const NIL: Self = Self(0x00);
    /// Symbol table of interned names.
    pub const SYMBOL_TABLE: Self = Self(0x01);
    /// Merkle node header (directory).
    pub const MERKLE_NODE: Self = Self(0x02);
    /// Datatype descriptor.
    pub const DATATYPE: Self = Self(0x03);
    /// Dataspace (shape) descriptor.
    pub const DATASPACE: Self = Self(0x04);
    /// Named, typed, shaped attribute.
    pub const ATTRIBUTE: Self = Self(0x05);
    /// Raw content block with no header of its own.
    pub const BLOB: Self = Self(0x06);

    /// The raw tag byte.
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Human-readable name for well-known tags.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::NIL => Some("nil"),
            Self::SYMBOL_TABLE => Some("symbol-table"),
            Self::MERKLE_NODE => Some("merkle-node"),
            Self::DATATYPE => Some("datatype"),
            Self::DATASPACE => Some("dataspace"),
            Self::ATTRIBUTE => Some("attribute"),
            Self::BLOB => Some("blob"),
            _ => None,
        }
    }

    /// Returns `true` for the tombstone tag.
    pub fn is_nil(self) -> bool {
        self == Self::NIL
    }
}

impl std::str::FromStr for MfsType {
    type Err = TypeError;

    /// Parse a well-known name (`"datatype"`) or a raw byte (`"0x40"`, `"64"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const KNOWN: [MfsType; 7] = [
            MfsType::NIL,
            MfsType::SYMBOL_TABLE,
            MfsType::MERKLE_NODE,
            MfsType::DATATYPE,
            MfsType::DATASPACE,
            MfsType::ATTRIBUTE,
            MfsType::BLOB,
        ];
        if let Some(tag) = KNOWN.iter().find(|t| t.name() == Some(s)) {
            return Ok(*tag);
        }
        let parsed = match s.strip_prefix("0x") {
            Some(hex) => u8::from_str_radix(hex, 16),
            None => s.parse::<u8>(),
        };
        parsed
            .map(Self)
            .map_err(|_| TypeError::UnknownTag(s.to_owned()))
    }
}

impl From<u8> for MfsType {
    fn from(tag: u8) -> Self {
        Self(tag)
    }
}

impl From<MfsType> for u8 {
    fn from(tag: MfsType) -> Self {
        tag.0
    }
}

impl fmt::Debug for MfsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "MfsType({name})"),
            None => write!(f, "MfsType({:#04x})", self.0),
        }
    }
}

impl fmt::Display for MfsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{:#04x}", self.0),
        }
    }
}
