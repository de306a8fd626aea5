//! Frame boundary detection.
//!
//! Servers reading frontend traffic from a socket, and anything else that needs to split a raw
//! stream before decoding it, can ask how long the next frame is without decoding the body.
use crate::postgres::ProtocolError;

/// Total size of the next typed frame in `buf`, message-type byte included.
///
/// Returns `Ok(None)` when `buf` does not yet hold the whole frame.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] if the length field cannot cover itself.
///
/// ```
/// use postro_codec::frame::typed_frame_len;
///
/// assert_eq!(typed_frame_len(b"Z\0\0\0\x05").unwrap(), None);
/// assert_eq!(typed_frame_len(b"Z\0\0\0\x05IS").unwrap(), Some(6));
/// ```
pub fn typed_frame_len(buf: &[u8]) -> Result<Option<usize>, ProtocolError> {
    let Some(&[msgtype, a, b, c, d]) = buf.get(..5) else {
        return Ok(None);
    };
    let length = i32::from_be_bytes([a, b, c, d]);
    if length < 4 {
        return Err(ProtocolError::invalid_length(msgtype, length));
    }
    // the length count includes itself, but not the message-type byte
    let full = 1 + length as usize;
    Ok((buf.len() >= full).then_some(full))
}

/// Total size of the next untyped frame in `buf`.
///
/// Untyped frames are the ones a client may send before the session starts: Startup,
/// SSLRequest and CancelRequest. Their length field is the first four bytes and counts itself.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] if the length cannot cover the length field and
/// the request code.
pub fn startup_frame_len(buf: &[u8]) -> Result<Option<usize>, ProtocolError> {
    let Some(&[a, b, c, d]) = buf.get(..4) else {
        return Ok(None);
    };
    let length = i32::from_be_bytes([a, b, c, d]);
    if length < 8 {
        return Err(ProtocolError::invalid_length(0, length));
    }
    let full = length as usize;
    Ok((buf.len() >= full).then_some(full))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::postgres::{Serializer, frontend};

    #[test]
    fn typed() {
        assert_eq!(typed_frame_len(b"").unwrap(), None);
        assert_eq!(typed_frame_len(b"S\0\0").unwrap(), None);
        assert_eq!(typed_frame_len(b"S\0\0\0\x04").unwrap(), Some(5));

        let query = Serializer::new().query("SELECT 1");
        assert_eq!(typed_frame_len(&query[..query.len() - 1]).unwrap(), None);
        assert_eq!(typed_frame_len(&query).unwrap(), Some(query.len()));

        let mut two = query.to_vec();
        two.extend_from_slice(&frontend::sync());
        assert_eq!(typed_frame_len(&two).unwrap(), Some(query.len()));
    }

    #[test]
    fn typed_invalid() {
        let err = typed_frame_len(b"D\0\0\0\x03").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength { msgtype: b'D', length: 3 }));
    }

    #[test]
    fn untyped() {
        let ssl = frontend::ssl_request();
        assert_eq!(startup_frame_len(&ssl).unwrap(), Some(8));
        assert_eq!(startup_frame_len(&ssl[..7]).unwrap(), None);

        let cancel = frontend::cancel(1, 2);
        assert_eq!(startup_frame_len(&cancel).unwrap(), Some(16));

        let startup = Serializer::new().startup([("user", "postgres")]);
        assert_eq!(startup_frame_len(&startup).unwrap(), Some(startup.len()));

        assert!(startup_frame_len(&[0, 0, 0, 4]).is_err());
    }
}
