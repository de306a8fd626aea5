//! Postgres Backend Messages
//!
//! Messages carrying no data are unit variants of [`BackendMessage`], so delivering them never
//! allocate, which matter on hot paths like `DataRow` heavy results interleaved with `ReadyForQuery`.
use bytes::Bytes;
use std::fmt;

use super::{Oid, PgFormat, PgType};

/// Postgres backend messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMessage {
    /// Identifies the message as a Parse-complete indicator.
    ParseComplete,
    /// Identifies the message as a Bind-complete indicator.
    BindComplete,
    /// Identifies the message as a Close-complete indicator.
    CloseComplete,
    /// Identifies the message as a no-data indicator.
    NoData,
    /// Identifies the message as a portal-suspended indicator.
    ///
    /// Note this only appears if an Execute message's row-count limit was reached.
    PortalSuspended,
    /// Identifies the message as a response to an empty query string.
    ///
    /// This substitutes for CommandComplete.
    EmptyQuery,
    /// Identifies the message as a COPY-complete indicator.
    CopyDone,
    /// Identifies the start of a streaming replication (Copy Both) session.
    ReplicationStart,
    ReadyForQuery(ReadyForQuery),
    CommandComplete(CommandComplete),
    RowDescription(RowDescription),
    ParameterDescription(ParameterDescription),
    DataRow(DataRow),
    ParameterStatus(ParameterStatus),
    BackendKeyData(BackendKeyData),
    Notification(NotificationResponse),
    Authentication(Authentication),
    /// Identifies the message as an error.
    Error(DatabaseError),
    /// A warning message. The frontend should display the message.
    Notice(DatabaseError),
    CopyInResponse(CopyResponse),
    CopyOutResponse(CopyResponse),
    CopyData(CopyData),
    /// Message type this codec does not recognize.
    ///
    /// The stream is still advanced by `length`, see [`Parser`][super::Parser].
    Unknown {
        msgtype: u8,
        length: u32,
    },
}

macro_rules! message_names {
    ($($msgtype:literal => $name:literal,)*) => {
        impl BackendMessage {
            /// Get message name from message type.
            ///
            /// Returns `"unknown"` for unknown message type.
            pub fn message_name(msgtype: u8) -> &'static str {
                match msgtype {
                    $($msgtype => $name,)*
                    _ => "unknown",
                }
            }
        }
    };
}

message_names! {
    b'1' => "parseComplete",
    b'2' => "bindComplete",
    b'3' => "closeComplete",
    b'n' => "noData",
    b's' => "portalSuspended",
    b'W' => "replicationStart",
    b'I' => "emptyQuery",
    b'c' => "copyDone",
    b'Z' => "readyForQuery",
    b'C' => "commandComplete",
    b'T' => "rowDescription",
    b't' => "parameterDescription",
    b'D' => "dataRow",
    b'S' => "parameterStatus",
    b'K' => "backendKeyData",
    b'A' => "notification",
    b'R' => "authentication",
    b'E' => "error",
    b'N' => "notice",
    b'G' => "copyInResponse",
    b'H' => "copyOutResponse",
    b'd' => "copyData",
}

impl BackendMessage {
    /// Message type byte this message is sent with.
    pub fn msgtype(&self) -> u8 {
        match self {
            Self::ParseComplete => b'1',
            Self::BindComplete => b'2',
            Self::CloseComplete => b'3',
            Self::NoData => b'n',
            Self::PortalSuspended => b's',
            Self::EmptyQuery => b'I',
            Self::CopyDone => b'c',
            Self::ReplicationStart => b'W',
            Self::ReadyForQuery(_) => b'Z',
            Self::CommandComplete(_) => b'C',
            Self::RowDescription(_) => b'T',
            Self::ParameterDescription(_) => b't',
            Self::DataRow(_) => b'D',
            Self::ParameterStatus(_) => b'S',
            Self::BackendKeyData(_) => b'K',
            Self::Notification(_) => b'A',
            Self::Authentication(_) => b'R',
            Self::Error(_) => b'E',
            Self::Notice(_) => b'N',
            Self::CopyInResponse(_) => b'G',
            Self::CopyOutResponse(_) => b'H',
            Self::CopyData(_) => b'd',
            Self::Unknown { msgtype, .. } => *msgtype,
        }
    }

    /// Stable name of the message.
    ///
    /// Authentication requests are named by their sub-code, unknown messages are named `"error"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authentication(auth) => auth.name(),
            Self::Unknown { .. } => "error",
            _ => Self::message_name(self.msgtype()),
        }
    }

    /// Returns `true` for [`Error`][Self::Error] and [`Unknown`][Self::Unknown].
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Unknown { .. })
    }
}

/// A decoded [`BackendMessage`] with the length field of its frame.
///
/// The length counts itself and the body, but not the message-type byte.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendFrame {
    pub length: u32,
    pub message: BackendMessage,
}

/// Identifies the message type. ReadyForQuery is sent whenever the backend is ready for a new query cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyForQuery {
    /// Current backend transaction status indicator.
    pub status: TransactionStatus,
}

/// Backend transaction status reported by [`ReadyForQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// `I`, not in a transaction block.
    Idle,
    /// `T`, in a transaction block.
    InTransaction,
    /// `E`, in a failed transaction block, queries will be rejected until block is ended.
    Failed,
    /// Any other indicator, kept as is.
    Other(u8),
}

impl TransactionStatus {
    pub fn from_byte(b: u8) -> TransactionStatus {
        match b {
            b'I' => Self::Idle,
            b'T' => Self::InTransaction,
            b'E' => Self::Failed,
            b => Self::Other(b),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match *self {
            Self::Idle => b'I',
            Self::InTransaction => b'T',
            Self::Failed => b'E',
            Self::Other(b) => b,
        }
    }

    pub fn as_char(&self) -> char {
        char::from(self.as_byte())
    }
}

/// Identifies the message as a command-completed response
///
/// For an INSERT command, the tag is INSERT oid rows, where rows is the number of rows inserted.
///
/// For a DELETE, UPDATE, MERGE, SELECT, MOVE, FETCH or COPY command, the tag is the command
/// followed by the number of rows affected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandComplete {
    /// The command tag. This is usually a single word that identifies which SQL command was completed.
    pub text: String,
}

impl CommandComplete {
    /// The leading command word of the tag, e.g. `BEGIN`, `COMMIT` or `INSERT`.
    pub fn command(&self) -> &str {
        self.text.split(' ').next().unwrap_or_default()
    }

    /// The trailing row count of the tag, if any.
    pub fn rows(&self) -> Option<u64> {
        self.text.rsplit(' ').next()?.parse().ok()
    }
}

/// Identifies the message as a row description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDescription {
    pub fields: Vec<Field>,
}

/// Column descriptor inside a [`RowDescription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// The field name.
    pub name: String,
    /// If the field can be identified as a column of a specific table,
    /// the object ID of the table; otherwise zero
    pub table_id: Oid,
    /// If the field can be identified as a column of a specific table,
    /// the attribute number of the column; otherwise zero.
    pub column_id: i16,
    /// The object ID of the field's data type.
    pub data_type_id: Oid,
    /// The data type size (see pg_type.typlen).
    /// Note that negative values denote variable-width types.
    pub data_type_size: i16,
    /// The type modifier (see pg_attribute.atttypmod).
    pub data_type_modifier: i32,
    /// In a RowDescription returned from the statement variant of Describe,
    /// the format code is not yet known and will always be text.
    pub format: PgFormat,
}

impl Field {
    /// Returns `true` if the column data type is `T`.
    pub fn is<T: PgType + ?Sized>(&self) -> bool {
        self.data_type_id == T::OID
    }
}

/// Identifies the message as a parameter description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescription {
    /// The object ID of each parameter data type, in order.
    pub data_type_ids: Vec<Oid>,
}

/// Identifies the message as a data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
    /// Column values as text, `None` for NULL.
    pub fields: Vec<Option<String>>,
}

/// Identifies the message as a run-time parameter status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterStatus {
    /// The name of the run-time parameter being reported
    pub name: String,
    /// The current value of the parameter
    pub value: String,
}

/// Identifies the message as cancellation key data.
///
/// The frontend must save these values if it wishes to be able to issue CancelRequest messages later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendKeyData {
    /// The process ID of this backend.
    pub process_id: i32,
    /// The secret key of this backend.
    pub secret_key: i32,
}

/// Identifies the message as a notification response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResponse {
    /// The process ID of the notifying backend process.
    pub process_id: i32,
    /// The name of the channel that the notify has been raised on.
    pub channel: String,
    /// The "payload" string passed from the notifying process.
    pub payload: String,
}

/// Identifies the message as an authentication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    /// Specifies that the authentication was successful.
    Ok,
    /// Specifies that a clear-text password is required.
    CleartextPassword,
    /// Specifies that an MD5-encrypted password is required.
    MD5Password {
        /// The salt to use when encrypting the password.
        salt: [u8; 4],
    },
    /// Specifies that SASL authentication is required.
    SASL {
        /// Authentication mechanisms, in the server's order of preference.
        mechanisms: Vec<String>,
    },
    /// Specifies that this message contains a SASL challenge.
    SASLContinue {
        /// SASL data, specific to the SASL mechanism being used.
        data: String,
    },
    /// Specifies that SASL authentication has completed.
    SASLFinal {
        /// SASL outcome "additional data", specific to the SASL mechanism being used.
        data: String,
    },
}

impl Authentication {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ok => "authenticationOk",
            Self::CleartextPassword => "authenticationCleartextPassword",
            Self::MD5Password { .. } => "authenticationMD5Password",
            Self::SASL { .. } => "authenticationSASL",
            Self::SASLContinue { .. } => "authenticationSASLContinue",
            Self::SASLFinal { .. } => "authenticationSASLFinal",
        }
    }
}

/// Body of `ErrorResponse` and `NoticeResponse`.
///
/// Fields of unrecognized type are ignored.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseError {
    /// `M`, the primary human-readable error message.
    pub message: String,
    /// `S`, ERROR, FATAL, or PANIC (in an error message), or WARNING, NOTICE, DEBUG, INFO, or LOG (in a notice message).
    pub severity: Option<String>,
    /// `C`, the SQLSTATE code for the error.
    pub code: Option<String>,
    /// `D`, an optional secondary error message carrying more detail about the problem.
    pub detail: Option<String>,
    /// `H`, an optional suggestion what to do about the problem.
    pub hint: Option<String>,
    /// `P`, error cursor position as an index into the original query string, in characters.
    pub position: Option<String>,
    /// `p`, same as `position`, but for an internally generated command.
    pub internal_position: Option<String>,
    /// `q`, the text of a failed internally-generated command.
    pub internal_query: Option<String>,
    /// `W`, the context in which the error occurred.
    pub where_: Option<String>,
    /// `s`
    pub schema: Option<String>,
    /// `t`
    pub table: Option<String>,
    /// `c`
    pub column: Option<String>,
    /// `d`
    pub data_type: Option<String>,
    /// `n`
    pub constraint: Option<String>,
    /// `F`, the file name of the source-code location where the error was reported.
    pub file: Option<String>,
    /// `L`, the line number of the source-code location where the error was reported.
    pub line: Option<String>,
    /// `R`, the name of the source-code routine reporting the error.
    pub routine: Option<String>,
}

impl DatabaseError {
    /// Assign a field by its identifying code.
    ///
    /// Returns `false` if the code is not recognized, the value is then dropped.
    pub fn set_field(&mut self, code: u8, value: String) -> bool {
        let slot = match code {
            b'M' => {
                self.message = value;
                return true;
            },
            b'S' => &mut self.severity,
            b'C' => &mut self.code,
            b'D' => &mut self.detail,
            b'H' => &mut self.hint,
            b'P' => &mut self.position,
            b'p' => &mut self.internal_position,
            b'q' => &mut self.internal_query,
            b'W' => &mut self.where_,
            b's' => &mut self.schema,
            b't' => &mut self.table,
            b'c' => &mut self.column,
            b'd' => &mut self.data_type,
            b'n' => &mut self.constraint,
            b'F' => &mut self.file,
            b'L' => &mut self.line,
            b'R' => &mut self.routine,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

impl std::error::Error for DatabaseError { }

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{severity}: ")?;
        }
        f.write_str(&self.message)?;
        if let Some(code) = &self.code {
            write!(f, " ({code})")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {detail}")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {hint}")?;
        }
        Ok(())
    }
}

/// Body of `CopyInResponse` and `CopyOutResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyResponse {
    /// Overall COPY format is binary, otherwise textual.
    pub binary: bool,
    /// The format of each column.
    pub column_formats: Vec<PgFormat>,
}

/// Identifies the message as COPY data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyData {
    /// Data that forms part of a COPY data stream.
    pub chunk: Bytes,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn command_tag() {
        let cmd = CommandComplete { text: "INSERT 0 14".into() };
        assert_eq!(cmd.command(), "INSERT");
        assert_eq!(cmd.rows(), Some(14));

        let cmd = CommandComplete { text: "BEGIN".into() };
        assert_eq!(cmd.command(), "BEGIN");
        assert_eq!(cmd.rows(), None);
    }

    #[test]
    fn error_fields() {
        let mut err = DatabaseError::default();
        assert!(err.set_field(b'M', "boom".into()));
        assert!(err.set_field(b'S', "ERROR".into()));
        assert!(!err.set_field(b'Z', "ignored".into()));
        assert_eq!(err.message, "boom");
        assert_eq!(err.severity.as_deref(), Some("ERROR"));
        assert_eq!(err.to_string(), "ERROR: boom");
    }

    #[test]
    fn names() {
        assert_eq!(BackendMessage::message_name(b'Z'), "readyForQuery");
        assert_eq!(BackendMessage::message_name(b'?'), "unknown");
        assert_eq!(BackendMessage::NoData.name(), "noData");
        let auth = BackendMessage::Authentication(Authentication::MD5Password { salt: [1, 2, 3, 4] });
        assert_eq!(auth.name(), "authenticationMD5Password");
        assert!(BackendMessage::Unknown { msgtype: b'!', length: 4 }.is_error());
        assert_eq!(BackendMessage::Unknown { msgtype: b'!', length: 4 }.name(), "error");
    }

    #[test]
    fn every_variant_is_named() {
        let messages = [
            BackendMessage::ParseComplete,
            BackendMessage::BindComplete,
            BackendMessage::CloseComplete,
            BackendMessage::NoData,
            BackendMessage::PortalSuspended,
            BackendMessage::EmptyQuery,
            BackendMessage::CopyDone,
            BackendMessage::ReplicationStart,
            BackendMessage::ReadyForQuery(ReadyForQuery { status: TransactionStatus::Idle }),
            BackendMessage::CommandComplete(CommandComplete { text: "BEGIN".into() }),
            BackendMessage::RowDescription(RowDescription { fields: vec![] }),
            BackendMessage::ParameterDescription(ParameterDescription { data_type_ids: vec![] }),
            BackendMessage::DataRow(DataRow { fields: vec![] }),
            BackendMessage::ParameterStatus(ParameterStatus { name: "a".into(), value: "b".into() }),
            BackendMessage::BackendKeyData(BackendKeyData { process_id: 1, secret_key: 2 }),
            BackendMessage::Notification(NotificationResponse {
                process_id: 1,
                channel: "c".into(),
                payload: "p".into(),
            }),
            BackendMessage::Error(DatabaseError::default()),
            BackendMessage::Notice(DatabaseError::default()),
            BackendMessage::CopyInResponse(CopyResponse { binary: false, column_formats: vec![] }),
            BackendMessage::CopyOutResponse(CopyResponse { binary: false, column_formats: vec![] }),
            BackendMessage::CopyData(CopyData { chunk: Bytes::new() }),
        ];
        let mut codes = messages.iter().map(BackendMessage::msgtype).collect::<Vec<_>>();
        for message in &messages {
            assert_ne!(message.name(), "unknown", "{message:?}");
        }
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), messages.len());
        assert_eq!(BackendMessage::CopyOutResponse(CopyResponse { binary: true, column_formats: vec![] }).name(), "copyOutResponse");
    }

    #[test]
    fn field_type() {
        let field = Field {
            name: "id".into(),
            table_id: 0,
            column_id: 0,
            data_type_id: 23,
            data_type_size: 4,
            data_type_modifier: -1,
            format: PgFormat::Text,
        };
        assert!(field.is::<i32>());
        assert!(!field.is::<str>());
    }

    #[test]
    fn transaction_status() {
        assert_eq!(TransactionStatus::from_byte(b'T'), TransactionStatus::InTransaction);
        assert_eq!(TransactionStatus::from_byte(b'x').as_char(), 'x');
    }
}
