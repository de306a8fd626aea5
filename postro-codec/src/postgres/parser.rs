//! Incremental backend message parser.
use bytes::{Bytes, BytesMut};

use super::{
    PgFormat, ProtocolError,
    backend::*,
};
use crate::{
    buffer::BufferReader,
    common::{log_warn, span, verbose},
    frame::typed_frame_len,
};

/// msgtype + length
const HEADER: usize = 1 + 4;

/// Decode the body of a single message, the reader is positioned right after the header.
type Decode = fn(&mut BufferReader<'_>, usize) -> Result<BackendMessage, ProtocolError>;

macro_rules! decoders {
    ($($msgtype:literal => $decode:expr,)*) => {
        const fn decoders() -> [Option<Decode>; 256] {
            let mut table: [Option<Decode>; 256] = [None; 256];
            $(table[$msgtype as usize] = Some($decode);)*
            table
        }
    };
}

decoders! {
    b'1' => decode_parse_complete,
    b'2' => decode_bind_complete,
    b'3' => decode_close_complete,
    b'n' => decode_no_data,
    b's' => decode_portal_suspended,
    b'c' => decode_copy_done,
    b'W' => decode_replication_start,
    b'I' => decode_empty_query,
    b'D' => decode_data_row,
    b'C' => decode_command_complete,
    b'Z' => decode_ready_for_query,
    b'A' => decode_notification,
    b'R' => decode_authentication,
    b'S' => decode_parameter_status,
    b'K' => decode_backend_key_data,
    b'E' => decode_error,
    b'N' => decode_notice,
    b'T' => decode_row_description,
    b't' => decode_parameter_description,
    b'G' => decode_copy_in_response,
    b'H' => decode_copy_out_response,
    b'd' => decode_copy_data,
}

static DECODERS: [Option<Decode>; 256] = decoders();

/// Incremental parser of postgres backend messages.
///
/// Bytes may arrive in arbitrary chunks, a message split across chunks is held in an internal
/// merge buffer until the rest of it arrives. The parser is connection scoped and must not be
/// shared between connections.
///
/// ```
/// use postro_codec::postgres::{BackendMessage, Parser, TransactionStatus};
///
/// let mut parser = Parser::new();
/// let mut messages = vec![];
///
/// parser.parse(b"Z\0\0", |m| messages.push(m)).unwrap();
/// assert!(messages.is_empty());
///
/// parser.parse(b"\0\x05I", |m| messages.push(m)).unwrap();
/// let [BackendMessage::ReadyForQuery(ready)] = &messages[..] else { panic!() };
/// assert_eq!(ready.status, TransactionStatus::Idle);
/// ```
#[derive(Debug, Default)]
pub struct Parser {
    buffer: BytesMut,
    offset: usize,
    remaining: usize,
    capacity: usize,
}

impl Parser {
    /// Create new parser, the merge buffer is allocated lazily.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create new parser with pre-sized merge buffer.
    ///
    /// The merge buffer shrinks back to `capacity` whenever it is drained.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buffer: BytesMut::zeroed(capacity), offset: 0, remaining: 0, capacity }
    }

    /// Current merge buffer size.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes held waiting for the rest of a message.
    pub fn buffered_len(&self) -> usize {
        self.remaining
    }

    /// Returns `true` if there is no partial message held.
    pub fn is_idle(&self) -> bool {
        self.remaining == 0
    }

    /// Feed a chunk of bytes, `on_message` is called for every complete message in arrival order.
    ///
    /// Unknown message types are delivered as [`BackendMessage::Unknown`] and skipped using their
    /// length field.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the stream can no longer be trusted, e.g. an unknown
    /// authentication request. Messages before the offending one are still delivered, buffered bytes
    /// are dropped, and the connection should be abandoned.
    pub fn parse<F>(&mut self, chunk: &[u8], mut on_message: F) -> Result<(), ProtocolError>
    where
        F: FnMut(BackendMessage),
    {
        self.parse_frames(chunk, |frame| on_message(frame.message))
    }

    /// Same as [`parse`][Parser::parse], but every message comes with the length field of
    /// its frame.
    ///
    /// ```
    /// use postro_codec::postgres::Parser;
    ///
    /// let mut frames = vec![];
    /// Parser::new().parse_frames(b"Z\0\0\0\x05I", |f| frames.push(f)).unwrap();
    /// assert_eq!(frames[0].length, 5);
    /// assert_eq!(frames[0].message.name(), "readyForQuery");
    /// ```
    pub fn parse_frames<F>(&mut self, chunk: &[u8], mut on_message: F) -> Result<(), ProtocolError>
    where
        F: FnMut(BackendFrame),
    {
        span!("parse", chunk = chunk.len(), buffered = self.remaining);

        if self.remaining == 0 {
            // nothing held, scan the chunk in place and only keep the tail
            let consumed = match scan(chunk, &mut on_message) {
                Ok(ok) => ok,
                Err(err) => {
                    self.reset();
                    return Err(err);
                },
            };
            let tail = &chunk[consumed..];
            if !tail.is_empty() {
                self.merge(tail);
            }
            return Ok(());
        }

        self.merge(chunk);

        let end = self.offset + self.remaining;
        let consumed = match scan(&self.buffer[self.offset..end], &mut on_message) {
            Ok(ok) => ok,
            Err(err) => {
                self.reset();
                return Err(err);
            },
        };

        if consumed == self.remaining {
            // release the merge buffer, bounding memory for idle connections
            self.reset();
        } else {
            self.offset += consumed;
            self.remaining -= consumed;
        }

        Ok(())
    }

    /// Append bytes after the unconsumed window.
    fn merge(&mut self, chunk: &[u8]) {
        let end = self.offset + self.remaining;
        let spare = self.buffer.len() - end;

        if chunk.len() > spare {
            let needed = self.remaining + chunk.len();
            if needed <= self.buffer.len() {
                // fits if the window slides to the front
                self.buffer.copy_within(self.offset..end, 0);
            } else {
                let mut size = self.buffer.len().max(1);
                while size < needed {
                    size *= 2;
                }
                verbose!(from = self.buffer.len(), to = size, "grow merge buffer");
                let mut buffer = BytesMut::zeroed(size);
                buffer[..self.remaining].copy_from_slice(&self.buffer[self.offset..end]);
                self.buffer = buffer;
            }
            self.offset = 0;
        }

        let end = self.offset + self.remaining;
        self.buffer[end..end + chunk.len()].copy_from_slice(chunk);
        self.remaining += chunk.len();
    }

    fn reset(&mut self) {
        if self.buffer.len() > self.capacity {
            self.buffer = BytesMut::zeroed(self.capacity);
        }
        self.offset = 0;
        self.remaining = 0;
    }
}

/// Decode every complete message in `buf`, returns the amount of bytes consumed.
fn scan<F>(buf: &[u8], on_message: &mut F) -> Result<usize, ProtocolError>
where
    F: FnMut(BackendFrame),
{
    let mut offset = 0;
    let mut reader = BufferReader::default();

    while let Some(full) = typed_frame_len(&buf[offset..])? {
        let msgtype = buf[offset];
        let length = full - 1;
        let frame = &buf[..offset + full];

        reader.msgtype = msgtype;
        reader.set_buffer(offset + HEADER, frame);

        let message = match DECODERS[msgtype as usize] {
            Some(decode) => decode(&mut reader, length)?,
            None => {
                log_warn!("received invalid response: {msgtype:x}");
                BackendMessage::Unknown { msgtype, length: length as u32 }
            },
        };

        verbose!(name = message.name(), length, "backend message");
        on_message(BackendFrame { length: length as u32, message });
        offset += full;
    }

    Ok(offset)
}

macro_rules! unit_msg {
    ($($decode:ident => $variant:ident,)*) => {$(
        fn $decode(_: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
            Ok(BackendMessage::$variant)
        }
    )*};
}

unit_msg! {
    decode_parse_complete => ParseComplete,
    decode_bind_complete => BindComplete,
    decode_close_complete => CloseComplete,
    decode_no_data => NoData,
    decode_portal_suspended => PortalSuspended,
    decode_copy_done => CopyDone,
    decode_replication_start => ReplicationStart,
    decode_empty_query => EmptyQuery,
}

fn decode_ready_for_query(reader: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
    let status = TransactionStatus::from_byte(reader.byte()?);
    Ok(BackendMessage::ReadyForQuery(ReadyForQuery { status }))
}

fn decode_command_complete(reader: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
    let text = reader.cstring()?;
    Ok(BackendMessage::CommandComplete(CommandComplete { text }))
}

fn decode_copy_data(reader: &mut BufferReader<'_>, length: usize) -> Result<BackendMessage, ProtocolError> {
    let chunk = Bytes::copy_from_slice(reader.bytes(length - 4)?);
    Ok(BackendMessage::CopyData(CopyData { chunk }))
}

fn decode_copy_in_response(reader: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
    decode_copy_response(reader).map(BackendMessage::CopyInResponse)
}

fn decode_copy_out_response(reader: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
    decode_copy_response(reader).map(BackendMessage::CopyOutResponse)
}

fn decode_copy_response(reader: &mut BufferReader<'_>) -> Result<CopyResponse, ProtocolError> {
    let binary = reader.byte()? != 0;
    let column_count = reader.int16()?;
    let mut column_formats = Vec::with_capacity(column_count.max(0) as usize);
    for _ in 0..column_count {
        column_formats.push(PgFormat::from_code(reader.int16()?));
    }
    Ok(CopyResponse { binary, column_formats })
}

fn decode_notification(reader: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
    let process_id = reader.int32()?;
    let channel = reader.cstring()?;
    let payload = reader.cstring()?;
    Ok(BackendMessage::Notification(NotificationResponse { process_id, channel, payload }))
}

fn decode_row_description(reader: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
    let field_count = reader.int16()?;
    let mut fields = Vec::with_capacity(field_count.max(0) as usize);
    for _ in 0..field_count {
        fields.push(decode_field(reader)?);
    }
    Ok(BackendMessage::RowDescription(RowDescription { fields }))
}

fn decode_field(reader: &mut BufferReader<'_>) -> Result<Field, ProtocolError> {
    Ok(Field {
        name: reader.cstring()?,
        table_id: reader.uint32()?,
        column_id: reader.int16()?,
        data_type_id: reader.uint32()?,
        data_type_size: reader.int16()?,
        data_type_modifier: reader.int32()?,
        format: PgFormat::from_code(reader.int16()?),
    })
}

fn decode_parameter_description(reader: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
    let param_count = reader.int16()?;
    let mut data_type_ids = Vec::with_capacity(param_count.max(0) as usize);
    for _ in 0..param_count {
        data_type_ids.push(reader.uint32()?);
    }
    Ok(BackendMessage::ParameterDescription(ParameterDescription { data_type_ids }))
}

fn decode_data_row(reader: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
    let field_count = reader.int16()?;
    let mut fields = Vec::with_capacity(field_count.max(0) as usize);
    for _ in 0..field_count {
        // -1 indicates a NULL column value, no value bytes follow
        let field = match reader.int32()? {
            -1 => None,
            len @ 0.. => Some(reader.string(len as usize)?),
            len => return Err(ProtocolError::invalid_length(reader.msgtype, len)),
        };
        fields.push(field);
    }
    Ok(BackendMessage::DataRow(DataRow { fields }))
}

fn decode_parameter_status(reader: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
    let name = reader.cstring()?;
    let value = reader.cstring()?;
    Ok(BackendMessage::ParameterStatus(ParameterStatus { name, value }))
}

fn decode_backend_key_data(reader: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
    let process_id = reader.int32()?;
    let secret_key = reader.int32()?;
    Ok(BackendMessage::BackendKeyData(BackendKeyData { process_id, secret_key }))
}

fn decode_authentication(reader: &mut BufferReader<'_>, length: usize) -> Result<BackendMessage, ProtocolError> {
    let auth = match reader.int32()? {
        0 => Authentication::Ok,
        3 => Authentication::CleartextPassword,
        5 => {
            let salt = reader.bytes(4)?;
            Authentication::MD5Password { salt: [salt[0], salt[1], salt[2], salt[3]] }
        },
        10 => {
            let mut mechanisms = vec![];
            loop {
                let mechanism = reader.cstring()?;
                if mechanism.is_empty() {
                    break;
                }
                mechanisms.push(mechanism);
            }
            Authentication::SASL { mechanisms }
        },
        // length + auth code
        11 => Authentication::SASLContinue { data: reader.string(length.saturating_sub(8))? },
        12 => Authentication::SASLFinal { data: reader.string(length.saturating_sub(8))? },
        code => return Err(ProtocolError::unknown_auth(code)),
    };
    Ok(BackendMessage::Authentication(auth))
}

fn decode_error(reader: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
    decode_error_fields(reader).map(BackendMessage::Error)
}

fn decode_notice(reader: &mut BufferReader<'_>, _: usize) -> Result<BackendMessage, ProtocolError> {
    decode_error_fields(reader).map(BackendMessage::Notice)
}

fn decode_error_fields(reader: &mut BufferReader<'_>) -> Result<DatabaseError, ProtocolError> {
    let mut error = DatabaseError::default();
    loop {
        let code = reader.byte()?;
        if code == b'\0' {
            break;
        }
        let value = reader.cstring()?;
        // frontends should silently ignore fields of unrecognized type
        error.set_field(code, value);
    }
    Ok(error)
}

#[cfg(test)]
mod test {
    use super::*;

    fn frame(msgtype: u8, body: &[u8]) -> Vec<u8> {
        let mut buf = vec![msgtype];
        buf.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    fn parse_all(parser: &mut Parser, chunk: &[u8]) -> Vec<BackendMessage> {
        let mut messages = vec![];
        parser.parse(chunk, |m| messages.push(m)).unwrap();
        messages
    }

    #[test]
    fn ready_for_query() {
        let mut parser = Parser::new();
        let mut frames = vec![];
        parser.parse_frames(&[0x5A, 0x00, 0x00, 0x00, 0x05, b'I'], |f| frames.push(f)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].length, 5);
        assert_eq!(frames[0].message.name(), "readyForQuery");
        let BackendMessage::ReadyForQuery(ready) = &frames[0].message else { panic!() };
        assert_eq!(ready.status.as_char(), 'I');
        assert_eq!(parser.buffered_len(), 0);
        assert!(parser.is_idle());
    }

    #[test]
    fn partial_header_and_body() {
        let msg = frame(b'C', b"SELECT 1\0");
        let mut parser = Parser::new();
        assert!(parse_all(&mut parser, &msg[..3]).is_empty());
        assert_eq!(parser.buffered_len(), 3);
        assert!(parse_all(&mut parser, &msg[3..7]).is_empty());
        assert_eq!(parser.buffered_len(), 7);
        let messages = parse_all(&mut parser, &msg[7..]);
        assert_eq!(
            messages,
            [BackendMessage::CommandComplete(CommandComplete { text: "SELECT 1".into() })]
        );
        assert!(parser.is_idle());
    }

    fn parameter_statuses() -> Vec<u8> {
        let mut stream = frame(b'S', b"client_encoding\0UTF8\0");
        stream.extend_from_slice(&frame(b'S', b"TimeZone\0UTC\0"));
        stream
    }

    fn assert_statuses(messages: &[BackendMessage]) {
        let [BackendMessage::ParameterStatus(a), BackendMessage::ParameterStatus(b)] = messages else {
            panic!("expected two parameter status, found {messages:?}");
        };
        assert_eq!((a.name.as_str(), a.value.as_str()), ("client_encoding", "UTF8"));
        assert_eq!((b.name.as_str(), b.value.as_str()), ("TimeZone", "UTC"));
    }

    #[test]
    fn merge_buffer_slides() {
        // 26 + 18 bytes
        let stream = parameter_statuses();
        let mut parser = Parser::with_capacity(32);
        let mut messages = vec![];

        parser.parse(&stream[..10], |m| messages.push(m)).unwrap();
        assert_eq!(parser.buffered_len(), 10);

        // fits the spare tail, completes the first message
        parser.parse(&stream[10..30], |m| messages.push(m)).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(parser.buffered_len(), 4);

        // only fits once the window slides to the front
        parser.parse(&stream[30..], |m| messages.push(m)).unwrap();
        assert_statuses(&messages);
        assert!(parser.is_idle());
    }

    #[test]
    fn frame_lengths() {
        let mut stream = frame(b'1', b"");
        stream.extend_from_slice(&frame(b'C', b"SELECT 1\0"));
        stream.extend_from_slice(&frame(b'!', b"junk"));
        let mut parser = Parser::new();
        let mut lengths = vec![];
        for chunk in stream.chunks(3) {
            parser.parse_frames(chunk, |f| lengths.push((f.message.msgtype(), f.length))).unwrap();
        }
        assert_eq!(lengths, [(b'1', 4), (b'C', 13), (b'!', 8)]);
    }

    #[test]
    fn merge_buffer_keeps_capacity() {
        let stream = parameter_statuses();
        let mut parser = Parser::with_capacity(32);

        parser.parse(&stream[..10], |_| {}).unwrap();
        parser.parse(&stream[10..26], |_| {}).unwrap();
        assert!(parser.is_idle());
        assert_eq!(parser.capacity(), 32);

        // 44 bytes held at once outgrow 32, then shrink back once drained
        let mut messages = vec![];
        parser.parse(&stream[..1], |m| messages.push(m)).unwrap();
        parser.parse(&stream[1..43], |m| messages.push(m)).unwrap();
        assert_eq!(parser.capacity(), 64);
        parser.parse(&stream[43..], |m| messages.push(m)).unwrap();
        assert_statuses(&messages);
        assert_eq!(parser.capacity(), 32);

        let mut parser = Parser::new();
        parser.parse(&stream[..10], |_| {}).unwrap();
        parser.parse(&stream[10..26], |_| {}).unwrap();
        assert_eq!(parser.capacity(), 0);
    }

    #[test]
    fn merge_buffer_grows() {
        let stream = parameter_statuses();
        let mut parser = Parser::new();
        let mut messages = vec![];
        for byte in &stream {
            parser.parse(std::slice::from_ref(byte), |m| messages.push(m)).unwrap();
        }
        assert_statuses(&messages);
        assert!(parser.is_idle());
    }

    #[test]
    fn keeps_tail_after_complete_message() {
        let mut stream = frame(b'1', b"");
        stream.extend_from_slice(&frame(b'2', b"")[..2]);
        let mut parser = Parser::new();
        assert_eq!(parse_all(&mut parser, &stream), [BackendMessage::ParseComplete]);
        assert_eq!(parser.buffered_len(), 2);
        assert_eq!(parse_all(&mut parser, b"\0\0\x04"), [BackendMessage::BindComplete]);
        assert!(parser.is_idle());
    }

    #[test]
    fn unknown_message_is_skipped() {
        let mut stream = frame(b'!', b"junk");
        stream.extend_from_slice(&frame(b'n', b""));
        let messages = parse_all(&mut Parser::new(), &stream);
        assert_eq!(
            messages,
            [BackendMessage::Unknown { msgtype: b'!', length: 8 }, BackendMessage::NoData]
        );
    }

    #[test]
    fn unknown_auth_raise() {
        let mut stream = frame(b'1', b"");
        stream.extend_from_slice(&frame(b'R', &7i32.to_be_bytes()));
        let mut parser = Parser::new();
        let mut messages = vec![];
        let err = parser.parse(&stream, |m| messages.push(m)).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownAuth { code: 7 }));
        assert_eq!(messages, [BackendMessage::ParseComplete]);
        assert!(parser.is_idle());
    }

    #[test]
    fn invalid_length() {
        let err = Parser::new().parse(b"Z\0\0\0\x02", |_| {}).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength { msgtype: b'Z', length: 2 }));
    }

    #[test]
    fn truncated_data_row() {
        let mut body = 1i16.to_be_bytes().to_vec();
        body.extend_from_slice(&10i32.to_be_bytes());
        body.extend_from_slice(b"abc");
        let err = Parser::new().parse(&frame(b'D', &body), |_| {}).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { msgtype: b'D', wanted: 10, remaining: 3 }));
    }

    #[test]
    fn negative_column_length() {
        let mut body = 1i16.to_be_bytes().to_vec();
        body.extend_from_slice(&(-2i32).to_be_bytes());
        let mut parser = Parser::new();
        let err = parser.parse(&frame(b'D', &body), |_| {}).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength { msgtype: b'D', length: -2 }));
        assert!(parser.is_idle());
    }

    #[test]
    fn copy_messages() {
        let mut stream = frame(b'G', &[1, 0, 2, 0, 0, 0, 1]);
        stream.extend_from_slice(&frame(b'd', b"1\tfoo\n"));
        stream.extend_from_slice(&frame(b'c', b""));
        let messages = parse_all(&mut Parser::new(), &stream);
        assert_eq!(
            messages,
            [
                BackendMessage::CopyInResponse(CopyResponse {
                    binary: true,
                    column_formats: vec![PgFormat::Text, PgFormat::Binary],
                }),
                BackendMessage::CopyData(CopyData { chunk: Bytes::from_static(b"1\tfoo\n") }),
                BackendMessage::CopyDone,
            ]
        );
    }
}
