//! Protocol error
use std::fmt;

use super::backend::BackendMessage;

/// An error when translating buffer from postgres.
///
/// Any of these means the byte accounting of the stream can no longer be trusted,
/// the connection should be abandoned.
pub enum ProtocolError {
    /// Authentication request with a sub-code this codec does not know.
    UnknownAuth {
        code: i32,
    },
    /// Frame header whose length cannot even cover the length field itself.
    InvalidLength {
        msgtype: u8,
        length: i32,
    },
    /// Frame payload ended before its own encoding did.
    Truncated {
        msgtype: u8,
        wanted: usize,
        remaining: usize,
    },
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ProtocolError::UnknownAuth { code } => {
                write!(f, "Unknown authentication message type `{code}`")
            },
            ProtocolError::InvalidLength { msgtype, length } => write!(
                f,
                "Invalid length `{length}` for message `{}`",
                BackendMessage::message_name(msgtype),
            ),
            ProtocolError::Truncated { msgtype, wanted, remaining } => write!(
                f,
                "Message `{}` truncated, wanted {wanted} bytes but {remaining} remaining",
                BackendMessage::message_name(msgtype),
            ),
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl ProtocolError {
    pub(crate) fn unknown_auth(code: i32) -> ProtocolError {
        Self::UnknownAuth { code }
    }

    pub(crate) fn invalid_length(msgtype: u8, length: i32) -> ProtocolError {
        Self::InvalidLength { msgtype, length }
    }
}
