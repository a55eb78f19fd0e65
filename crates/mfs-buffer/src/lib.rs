//! Word-aligned byte buffer for MFS records.
//!
//! Every record in the format is built and parsed through a [`ByteBuffer`]:
//! a fixed-capacity, zero-filled byte array with a single cursor shared by
//! reads and writes. Capacity is always a multiple of [`WORD`] and never grows.
//! Every operation checks bounds before touching the data, so a failed read
//! or write leaves both the content and the cursor exactly as they were.

pub mod buffer;
pub mod error;
pub mod packed;

pub use buffer::{align_up, checked_align_up, padding_for, ByteBuffer, WORD};
pub use error::{BufferError, BufferResult};
pub use packed::Packed;
