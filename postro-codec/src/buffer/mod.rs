//! Byte buffers the codec is built on.
//!
//! - [`Writer`], accumulate one frontend message with a back-patched header
//! - [`BufferReader`], decode fields from a complete backend message
mod reader;
mod writer;

pub use reader::BufferReader;
pub use writer::Writer;
