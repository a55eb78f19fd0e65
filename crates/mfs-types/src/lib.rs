//! Foundation types for MFS, the Merkle File Store.
//!
//! Every other MFS crate depends on `mfs-types`.
//!
//! # Key Types
//!
//! - [`MfsType`]: 1-byte record type tag that prefixes every serialized object
//! - [`ContentHash`]: 20-byte SHA-1 digest identifying a block by its content

pub mod error;
pub mod hash;
pub mod tag;

pub use error::TypeError;
pub use hash::{ContentHash, HASH_LEN};
pub use tag::MfsType;
