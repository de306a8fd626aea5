use crate::postgres::ProtocolError;

/// Cursor over a backend message.
///
/// The reader is re-bound to each message with [`set_buffer`][BufferReader::set_buffer],
/// starting just after the message header. All integers are read in network byte order.
///
/// The [`Parser`][crate::postgres::Parser] only hands complete frames to decoders, reads past
/// the bound buffer are reported as [`ProtocolError::Truncated`].
#[derive(Debug, Default)]
pub struct BufferReader<'a> {
    buffer: &'a [u8],
    offset: usize,
    pub(crate) msgtype: u8,
}

impl<'a> BufferReader<'a> {
    /// Create reader over `buffer` starting at `offset`.
    pub fn new(offset: usize, buffer: &'a [u8]) -> Self {
        Self { buffer, offset, msgtype: 0 }
    }

    /// Rebind the reader to another buffer.
    pub fn set_buffer(&mut self, offset: usize, buffer: &'a [u8]) {
        self.offset = offset;
        self.buffer = buffer;
    }

    /// Current cursor position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left between the cursor and the end of the bound buffer.
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let Some(bytes) = self.buffer.get(self.offset..self.offset + len) else {
            return Err(ProtocolError::Truncated {
                msgtype: self.msgtype,
                wanted: len,
                remaining: self.remaining(),
            });
        };
        self.offset += len;
        Ok(bytes)
    }

    pub fn byte(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub fn int16(&mut self) -> Result<i16, ProtocolError> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    pub fn int32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn uint32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read exactly `len` bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        self.take(len)
    }

    /// Read exactly `len` bytes as UTF-8 text.
    ///
    /// Invalid sequences are replaced rather than rejected.
    pub fn string(&mut self, len: usize) -> Result<String, ProtocolError> {
        self.take(len).map(lossy)
    }

    /// Read nul terminated string, the cursor ends after the nul.
    pub fn cstring(&mut self) -> Result<String, ProtocolError> {
        let rest = self.buffer.get(self.offset..).unwrap_or_default();
        let Some(end) = rest.iter().position(|e| matches!(e, b'\0')) else {
            return Err(ProtocolError::Truncated {
                msgtype: self.msgtype,
                wanted: rest.len() + 1,
                remaining: rest.len(),
            });
        };
        let string = lossy(&rest[..end]);
        self.offset += end + 1/* nul */;
        Ok(string)
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
