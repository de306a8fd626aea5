//! Postgres Frontend and Backend Protocol
//!
//! ## Messaging Overview
//!
//! All communication is through a stream of messages. The first byte of a message identifies the message type,
//! and the next four bytes specify the length of the rest of the message (this length count includes itself,
//! but not the message-type byte). The remaining contents of the message are determined by the message type.
//!
//! ```text
//! ┏━━━━┳━━━━━━━━━━━━━━━━━━━┳━━━━━━┓
//! ┃ Ty ┃       Length      ┃ Body ┃
//! ┣━━━━╋━━━━━━━━━━━━━━━━━━━╋━━━━━━┫
//! ┃ u8 ┃        i32        ┃ [u8] ┃
//! ┣━━━━╋━━━━━━━━━━━━━━━━━━━╋━━━━━━┫
//! ┃ 5a ┃ 00 | 00 | 00 | 05 ┃  49  ┃
//! ┗━━━━┻━━━━━━━━━━━━━━━━━━━┻━━━━━━┛
//! ```
//!
//! For historical reasons, the very first message sent by the client (the startup message)
//! has no initial message-type byte, neither do SSLRequest and CancelRequest.
//!
//! Frontend messages are composed by [`Serializer`] and the free functions in [`frontend`].
//! Backend messages are read incrementally by [`Parser`], which accepts arbitrary chunks
//! of the byte stream and yields [`BackendMessage`] in order.
//!
//! ## [`Format`][PgFormat] and Format Codes
//!
//! Text has format code zero, and Binary has format code one.
//!
//! <https://www.postgresql.org/docs/current/protocol-overview.html>

mod pg_type;
mod pg_format;

pub mod frontend;
pub mod backend;
pub mod parser;

mod error;

pub use pg_type::{Oid, PgType, UNSPECIFIED};
pub use pg_format::PgFormat;

pub use frontend::{BindConfig, ExecOptions, Param, ParseQuery, PortalTarget, Serializer, TargetKind};
pub use backend::{
    Authentication, BackendFrame, BackendKeyData, BackendMessage, CommandComplete, CopyData,
    CopyResponse, DataRow, DatabaseError, Field, NotificationResponse, ParameterDescription,
    ParameterStatus, ReadyForQuery, RowDescription, TransactionStatus,
};
pub use parser::Parser;
pub use error::ProtocolError;
