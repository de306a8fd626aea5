//! Postgres Frontend Messages
//!
//! Every function returns exactly one complete frame. Frames with fixed content are `'static`
//! and never allocate, the rest are composed by a connection scoped [`Serializer`].
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};

use super::{Oid, PgFormat};
use crate::{
    buffer::Writer,
    common::{log_warn, verbose},
    ext::{BufMutExt, StrExt, UsizeExt},
};

/// The protocol version number, 3.0.
///
/// The most significant 16 bits are the major version number,
/// the least significant 16 bits are the minor version number.
pub const PROTOCOL_VERSION: (i16, i16) = (3, 0);

/// Identifiers longer than this are truncated by the server.
pub const MAX_IDENTIFIER_LEN: usize = 63;

const SSL_REQUEST: &[u8] = &[0, 0, 0, 8, 0x04, 0xd2, 0x16, 0x2f];
const SYNC: &[u8] = &[b'S', 0, 0, 0, 4];
const FLUSH: &[u8] = &[b'H', 0, 0, 0, 4];
const TERMINATE: &[u8] = &[b'X', 0, 0, 0, 4];
const COPY_DONE: &[u8] = &[b'c', 0, 0, 0, 4];
const EMPTY_EXECUTE: &[u8] = &[b'E', 0, 0, 0, 9, 0, 0, 0, 0, 0];
const EMPTY_DESCRIBE_PORTAL: &[u8] = &[b'D', 0, 0, 0, 6, b'P', 0];
const EMPTY_DESCRIBE_STATEMENT: &[u8] = &[b'D', 0, 0, 0, 6, b'S', 0];

/// `80877103`, SSLRequest code.
pub const SSL_REQUEST_CODE: (i16, i16) = (1234, 5679);

/// `80877102`, CancelRequest code.
pub const CANCEL_REQUEST_CODE: (i16, i16) = (1234, 5678);

/// Ask the server whether it supports SSL.
///
/// Sent before [`Startup`][Serializer::startup], the message has no message type.
pub fn ssl_request() -> Bytes {
    Bytes::from_static(SSL_REQUEST)
}

/// Identifies the message as a Sync command.
pub fn sync() -> Bytes {
    Bytes::from_static(SYNC)
}

/// Identifies the message as a Flush command.
pub fn flush() -> Bytes {
    Bytes::from_static(FLUSH)
}

/// Identifies the message as a termination.
pub fn terminate() -> Bytes {
    Bytes::from_static(TERMINATE)
}

/// Identifies the message as a COPY-complete indicator.
pub fn copy_done() -> Bytes {
    Bytes::from_static(COPY_DONE)
}

/// Identifies the message as a COPY-failure indicator.
pub fn copy_fail(message: &str) -> Bytes {
    cstring_message(b'f', None, message)
}

/// Cancel a running query of another session.
///
/// This is sent on a fresh connection, instead of the session being cancelled.
/// The message has no message type.
pub fn cancel(process_id: i32, secret_key: i32) -> Bytes {
    let mut buf = BytesMut::with_capacity(16);
    buf.put_i32(16);
    buf.put_i16(CANCEL_REQUEST_CODE.0);
    buf.put_i16(CANCEL_REQUEST_CODE.1);
    buf.put_i32(process_id);
    buf.put_i32(secret_key);
    buf.freeze()
}

/// Message whose body is an optional kind byte followed by one string.
fn cstring_message(msgtype: u8, kind: Option<u8>, string: &str) -> Bytes {
    let kind_len = usize::from(kind.is_some());
    let len = 4 + kind_len + string.nul_string_len();
    let mut buf = BytesMut::with_capacity(1 + len);
    buf.put_u8(msgtype);
    buf.put_i32(len.to_i32());
    if let Some(kind) = kind {
        buf.put_u8(kind);
    }
    buf.put_nul_string(string);
    buf.freeze()
}

/// Parse command.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseQuery<'a> {
    /// Prepared statement name, an empty string selects the unnamed prepared statement.
    pub name: &'a str,
    /// The query string to be parsed.
    pub text: &'a str,
    /// Parameter data types to prespecify.
    ///
    /// Placing [`UNSPECIFIED`][super::pg_type::UNSPECIFIED] leave the type to be inferred.
    pub types: &'a [Oid],
}

/// Bind command.
#[derive(Debug, Default, Clone, Copy)]
pub struct BindConfig<'a> {
    /// The name of the destination portal, an empty string selects the unnamed portal.
    pub portal: &'a str,
    /// The name of the source prepared statement, an empty string selects the unnamed prepared statement.
    pub statement: &'a str,
    /// Request all result columns in binary format.
    pub binary: bool,
    /// Parameter values.
    pub values: &'a [Param<'a>],
}

/// Execute command.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecOptions<'a> {
    /// The name of the portal to execute, an empty string selects the unnamed portal.
    pub portal: &'a str,
    /// Maximum number of rows to return, zero denotes "no limit".
    ///
    /// Values above `i32::MAX` are sent as `i32::MAX`.
    pub rows: u32,
}

/// Which object a Describe or Close refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Portal,
    Statement,
}

impl TargetKind {
    pub fn as_byte(&self) -> u8 {
        match self {
            TargetKind::Portal => b'P',
            TargetKind::Statement => b'S',
        }
    }
}

/// Target of a Describe or Close command.
#[derive(Debug, Clone, Copy)]
pub struct PortalTarget<'a> {
    pub kind: TargetKind,
    /// An empty string selects the unnamed prepared statement or portal.
    pub name: &'a str,
}

impl<'a> PortalTarget<'a> {
    pub fn portal(name: &'a str) -> Self {
        Self { kind: TargetKind::Portal, name }
    }

    pub fn statement(name: &'a str) -> Self {
        Self { kind: TargetKind::Statement, name }
    }
}

/// A Bind parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param<'a> {
    /// Sent with length -1 and no value bytes.
    Null,
    /// Sent as UTF-8 text.
    Text(Cow<'a, str>),
    /// Sent verbatim in binary format.
    Binary(Cow<'a, [u8]>),
}

impl Param<'_> {
    /// Format code sent for this value.
    ///
    /// NULL carries no bytes, it is tagged as text.
    pub fn format(&self) -> PgFormat {
        match self {
            Param::Binary(_) => PgFormat::Binary,
            Param::Null | Param::Text(_) => PgFormat::Text,
        }
    }
}

impl<'a> From<&'a str> for Param<'a> {
    fn from(value: &'a str) -> Self {
        Param::Text(Cow::Borrowed(value))
    }
}

impl From<String> for Param<'_> {
    fn from(value: String) -> Self {
        Param::Text(Cow::Owned(value))
    }
}

impl<'a> From<&'a [u8]> for Param<'a> {
    fn from(value: &'a [u8]) -> Self {
        Param::Binary(Cow::Borrowed(value))
    }
}

impl From<Vec<u8>> for Param<'_> {
    fn from(value: Vec<u8>) -> Self {
        Param::Binary(Cow::Owned(value))
    }
}

impl From<bool> for Param<'_> {
    fn from(value: bool) -> Self {
        Param::Text(Cow::Borrowed(if value { "true" } else { "false" }))
    }
}

impl<'a, T: Into<Param<'a>>> From<Option<T>> for Param<'a> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Param::Null, Into::into)
    }
}

macro_rules! param_int {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Param<'_> {
            fn from(value: $ty) -> Self {
                Param::Text(Cow::Owned(itoa::Buffer::new().format(value).to_owned()))
            }
        }
    )*};
}

param_int!(i16, i32, i64, u16, u32, u64);

/// Composer of frontend messages for a single connection.
///
/// The serializer owns its buffers, each connection should have its own.
///
/// ```
/// use postro_codec::postgres::{frontend, Serializer};
///
/// let mut ser = Serializer::new();
/// let frame = ser.query("SELECT 1");
/// assert_eq!(frame[0], b'Q');
/// assert_eq!(&frontend::sync()[..], b"S\0\0\0\x04");
/// ```
#[derive(Debug, Default)]
pub struct Serializer {
    writer: Writer,
    param_writer: Writer,
}

impl Serializer {
    /// Create serializer with default buffer size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create serializer whose buffers start at `size` bytes per message.
    pub fn with_capacity(size: usize) -> Self {
        Self { writer: Writer::with_capacity(size), param_writer: Writer::with_capacity(size) }
    }

    /// Postgres Startup message.
    ///
    /// For historical reasons, the very first message sent by the client has no message type.
    ///
    /// `client_encoding` is always requested as `UTF8` after the given parameters.
    pub fn startup<'a, I>(&mut self, params: I) -> Bytes
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.writer.add_i16(PROTOCOL_VERSION.0).add_i16(PROTOCOL_VERSION.1);
        for (key, value) in params {
            self.writer.add_cstring(key).add_cstring(value);
        }
        self.writer.add_cstring("client_encoding").add_cstring("UTF8");

        // A zero byte is required as a terminator after the last name/value pair.
        let body = self.writer.add_cstring("").flush(None);

        // untyped length includes itself
        let len = body.len() + 4;
        let mut buf = BytesMut::with_capacity(len);
        buf.put_i32(len.to_i32());
        buf.put_slice(&body);
        buf.freeze()
    }

    /// Identifies the message as a password response.
    pub fn password(&mut self, password: &str) -> Bytes {
        self.writer.add_cstring(password).flush(Some(b'p'))
    }

    /// SASL initial response, the selected mechanism and its initial client response.
    pub fn sasl_initial_response(&mut self, mechanism: &str, initial_response: &str) -> Bytes {
        self.writer
            .add_cstring(mechanism)
            .add_i32(initial_response.len().to_i32())
            .add_string(initial_response)
            .flush(Some(b'p'))
    }

    /// SASL response, data specific to the mechanism being used.
    pub fn sasl_response(&mut self, response: &str) -> Bytes {
        self.writer.add_string(response).flush(Some(b'p'))
    }

    /// Identifies the message as a simple query.
    pub fn query(&mut self, sql: &str) -> Bytes {
        self.writer.add_cstring(sql).flush(Some(b'Q'))
    }

    /// Identifies the message as a Parse command.
    ///
    /// Statement name longer than [`MAX_IDENTIFIER_LEN`] is warned about, but still sent,
    /// the server will truncate it.
    pub fn parse(&mut self, query: ParseQuery<'_>) -> Bytes {
        if query.name.len() > MAX_IDENTIFIER_LEN {
            log_warn!(
                "Postgres only supports {MAX_IDENTIFIER_LEN} characters for query names. \
                You supplied {} ({}), it will be truncated by the server",
                query.name,
                query.name.len(),
            );
        }

        self.writer
            .add_cstring(query.name)
            .add_cstring(query.text)
            .add_i16(query.types.len().to_i16());

        for &oid in query.types {
            self.writer.add_i32(oid as i32);
        }

        self.writer.flush(Some(b'P'))
    }

    /// Identifies the message as a Bind command.
    pub fn bind(&mut self, config: BindConfig<'_>) -> Bytes {
        let len = config.values.len().to_i16();

        self.writer.add_cstring(config.portal).add_cstring(config.statement);

        // one format code per parameter, while the values are written to the param writer
        self.writer.add_i16(len);
        for value in config.values {
            self.writer.add_i16(value.format().format_code());
            match value {
                Param::Null => {
                    // -1 indicates a NULL parameter value, no value bytes follow
                    self.param_writer.add_i32(-1);
                },
                Param::Text(text) => {
                    self.param_writer.add_i32(text.len().to_i32()).add_string(text);
                },
                Param::Binary(bytes) => {
                    self.param_writer.add_i32(bytes.len().to_i32()).add(bytes);
                },
            }
        }

        self.writer.add_i16(len);
        let values = self.param_writer.flush(None);
        self.writer.add(&values);

        // all result columns use the same format code
        let result_format = if config.binary { PgFormat::Binary } else { PgFormat::Text };
        self.writer.add_i16(1).add_i16(result_format.format_code());

        verbose!(params = len, binary = config.binary, "bind");
        self.writer.flush(Some(b'B'))
    }

    /// Identifies the message as an Execute command.
    pub fn execute(&mut self, options: ExecOptions<'_>) -> Bytes {
        if options.portal.is_empty() && options.rows == 0 {
            return Bytes::from_static(EMPTY_EXECUTE);
        }
        self.writer
            .add_cstring(options.portal)
            .add_i32(i32::try_from(options.rows).unwrap_or(i32::MAX))
            .flush(Some(b'E'))
    }

    /// Identifies the message as a Describe command.
    pub fn describe(&mut self, target: PortalTarget<'_>) -> Bytes {
        match (target.kind, target.name) {
            (TargetKind::Portal, "") => Bytes::from_static(EMPTY_DESCRIBE_PORTAL),
            (TargetKind::Statement, "") => Bytes::from_static(EMPTY_DESCRIBE_STATEMENT),
            (kind, name) => cstring_message(b'D', Some(kind.as_byte()), name),
        }
    }

    /// Identifies the message as a Close command.
    pub fn close(&mut self, target: PortalTarget<'_>) -> Bytes {
        cstring_message(b'C', Some(target.kind.as_byte()), target.name)
    }

    /// Identifies the message as COPY data.
    pub fn copy_data(&mut self, chunk: &[u8]) -> Bytes {
        self.writer.add(chunk).flush(Some(b'd'))
    }

    /// See [`sync`].
    pub fn sync(&self) -> Bytes {
        sync()
    }

    /// See [`flush`].
    pub fn flush(&self) -> Bytes {
        flush()
    }

    /// See [`terminate`].
    pub fn terminate(&self) -> Bytes {
        terminate()
    }

    /// See [`copy_done`].
    pub fn copy_done(&self) -> Bytes {
        copy_done()
    }

    /// See [`copy_fail`].
    pub fn copy_fail(&self, message: &str) -> Bytes {
        copy_fail(message)
    }
}
