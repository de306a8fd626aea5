use bytes::{Buf, Bytes, BytesMut};

use crate::ext::UsizeExt;

/// msgtype + length
const HEADER: usize = 1 + 4;

/// Default arena size in bytes.
pub const DEFAULT_SIZE: usize = 256;

/// Growable buffer which accumulate a single frontend message.
///
/// The first 5 bytes are reserved for the message type and length, which are
/// written by [`flush`][Writer::flush] once the body size is known.
///
/// The writer is connection scoped, it must not be shared between connections.
#[derive(Debug)]
pub struct Writer {
    buffer: BytesMut,
    offset: usize,
    size: usize,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    /// Create writer with [`DEFAULT_SIZE`] arena.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SIZE)
    }

    /// Create writer which allocate `size` bytes arena for each message.
    pub fn with_capacity(size: usize) -> Self {
        let size = size.max(HEADER);
        Self { buffer: BytesMut::zeroed(size), offset: HEADER, size }
    }

    /// Length of the body written so far.
    pub fn len(&self) -> usize {
        self.offset - HEADER
    }

    /// Returns `true` if no body have been written.
    pub fn is_empty(&self) -> bool {
        self.offset == HEADER
    }

    /// Current arena capacity.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn ensure(&mut self, size: usize) {
        let remaining = self.buffer.len() - self.offset;
        if remaining < size {
            let old = self.buffer.len();
            // exponential growth factor of around ~ 1.5
            let new_size = old + (old >> 1) + size;
            let mut buffer = BytesMut::zeroed(new_size);
            buffer[..self.offset].copy_from_slice(&self.buffer[..self.offset]);
            self.buffer = buffer;
        }
    }

    fn put(&mut self, bytes: &[u8]) -> &mut Self {
        self.ensure(bytes.len());
        self.buffer[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
        self
    }

    pub fn add_i32(&mut self, num: i32) -> &mut Self {
        self.put(&num.to_be_bytes())
    }

    pub fn add_i16(&mut self, num: i16) -> &mut Self {
        self.put(&num.to_be_bytes())
    }

    /// Write string and nul termination.
    ///
    /// Empty string still writes the nul.
    pub fn add_cstring(&mut self, string: &str) -> &mut Self {
        self.ensure(string.len() + 1);
        self.put(string.as_bytes());
        self.put(b"\0")
    }

    /// Write string without nul termination.
    pub fn add_string(&mut self, string: &str) -> &mut Self {
        self.put(string.as_bytes())
    }

    /// Write raw bytes.
    pub fn add(&mut self, bytes: &[u8]) -> &mut Self {
        self.put(bytes)
    }

    /// Finish the message.
    ///
    /// With `msgtype`, returns the complete frame with its header written.
    ///
    /// Without it, returns only the body, for the caller to prefix with its own
    /// untyped length, as [`Startup`] does.
    ///
    /// The writer is reset with a fresh arena afterwards.
    ///
    /// [`Startup`]: crate::postgres::Serializer::startup
    pub fn flush(&mut self, msgtype: Option<u8>) -> Bytes {
        let mut frame = self.buffer.split_to(self.offset);
        match msgtype {
            Some(msgtype) => {
                // length count includes itself, but not the message-type byte
                let len = (self.offset - 1).to_i32();
                frame[0] = msgtype;
                frame[1..HEADER].copy_from_slice(&len.to_be_bytes());
            },
            None => frame.advance(HEADER),
        }
        self.offset = HEADER;
        self.buffer = BytesMut::zeroed(self.size);
        frame.freeze()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn typed_flush() {
        let mut w = Writer::new();
        w.add_cstring("SELECT 1");
        let frame = w.flush(Some(b'Q'));
        assert_eq!(&frame[..], b"Q\0\0\0\x0dSELECT 1\0");
        assert!(w.is_empty());
    }

    #[test]
    fn untyped_flush() {
        let mut w = Writer::new();
        w.add_i16(3).add_i16(0).add_cstring("");
        let body = w.flush(None);
        assert_eq!(&body[..], b"\0\x03\0\0\0");
    }

    #[test]
    fn empty_body() {
        let mut w = Writer::new();
        assert_eq!(&w.flush(Some(b'S'))[..], b"S\0\0\0\x04");
    }

    #[test]
    fn grow() {
        let mut w = Writer::with_capacity(8);
        w.add_i32(-1);
        assert_eq!(w.capacity(), 8 + 4 + 4);
        w.add_string("abcdefghijklmnop");
        assert!(w.capacity() >= HEADER + 20);
        assert_eq!(w.len(), 20);
        let frame = w.flush(Some(b'd'));
        assert_eq!(&frame[..9], b"d\0\0\0\x18\xff\xff\xff\xff");
        assert_eq!(&frame[9..], b"abcdefghijklmnop");
        assert_eq!(w.capacity(), 8);
    }
}
