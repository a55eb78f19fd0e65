//! Record encodings for MFS, the Merkle File Store.
//!
//! Every record starts with a one-byte [`MfsType`](mfs_types::MfsType) tag.
//! [`decode_any`] peeks that tag and hands the buffer to the decoder
//! registered for it in a [`HeaderRegistry`].
//!
//! Records with a variable-length body decode in two steps. The 16-byte
//! header comes first, and its [`ObjectHeader::total_size`] tells the caller
//! how many more bytes to fetch before decoding the body.
//!
//! # Record types
//!
//! - [`DatatypeHeader`]: kind and size of one element
//! - [`DataspaceHeader`]: the shape of an array
//! - [`SymbolTable`]: ordered interned strings
//! - [`Attribute`]: a named, typed, shaped value
//! - [`MerkleNodeHeader`] / [`MerkleNode`]: directories of hash references

pub mod attribute;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod header;
pub mod node;
pub mod symbol_table;

pub use attribute::{Attribute, AttributeHeader};
pub use dataspace::{DataspaceHeader, Dimension};
pub use datatype::{DatatypeClass, DatatypeHeader, StringEncoding, StringPadding};
pub use error::{FormatError, FormatResult};
pub use header::{builtin_registry, decode_any, Encode, HeaderDecoder, HeaderRegistry, ObjectHeader};
pub use node::{MerkleNode, MerkleNodeHeader, MERKLE_HEADER_LEN, MERKLE_NODE_LEN, MERKLE_SIGNATURE};
pub use symbol_table::{SymbolEntry, SymbolTable, SymbolTableHeader};
