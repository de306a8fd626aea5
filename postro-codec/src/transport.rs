//! The [`PgStream`] transport.
use std::{collections::VecDeque, io};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    Result,
    common::verbose,
    config::Config,
    postgres::{BackendMessage, Parser, Serializer},
};

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// A buffered stream which can send and receive postgres message.
///
/// It owns the [`Serializer`] and [`Parser`] of one connection, the caller drives the protocol
/// flow by sending frames and receiving decoded messages.
#[derive(Debug)]
pub struct PgStream<IO> {
    io: IO,
    serializer: Serializer,
    parser: Parser,
    read_buf: BytesMut,
    write_buf: BytesMut,
    inbox: VecDeque<BackendMessage>,
}

impl<IO> PgStream<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: IO) -> Self {
        Self {
            io,
            serializer: Serializer::new(),
            parser: Parser::new(),
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            inbox: VecDeque::new(),
        }
    }

    /// Serializer to compose frames for this connection.
    pub fn frontend(&mut self) -> &mut Serializer {
        &mut self.serializer
    }

    /// Returns the underlying io.
    pub fn into_inner(self) -> IO {
        self.io
    }

    /// Send a frame to the backend.
    ///
    /// Note that this send is buffered, caller must also call [`flush`][Self::flush] or
    /// [`recv`][Self::recv] afterwards.
    pub fn send(&mut self, frame: impl AsRef<[u8]>) {
        self.write_buf.extend_from_slice(frame.as_ref());
    }

    /// Send the Startup message for `config`.
    pub fn send_startup(&mut self, config: &Config) {
        let frame = self.serializer.startup(config.startup_params());
        self.send(frame);
    }

    /// Write all buffered frames to the underlying io.
    pub async fn flush(&mut self) -> io::Result<()> {
        verbose!(len = self.write_buf.len(), "flush");
        self.io.write_all_buf(&mut self.write_buf).await?;
        self.io.flush().await
    }

    /// Receive the next backend message.
    ///
    /// Buffered frames are flushed first, the io is only read when no decoded message is pending.
    ///
    /// # Errors
    ///
    /// End of stream before the next message is an [`io::ErrorKind::UnexpectedEof`] error.
    /// Any [`ProtocolError`][crate::postgres::ProtocolError] means the connection should be abandoned.
    pub async fn recv(&mut self) -> Result<BackendMessage> {
        if !self.write_buf.is_empty() {
            self.flush().await?;
        }

        loop {
            if let Some(message) = self.inbox.pop_front() {
                return Ok(message);
            }

            verbose!(buffered = self.parser.buffered_len(), "read");

            self.read_buf.clear();
            self.read_buf.reserve(DEFAULT_BUF_CAPACITY);
            if self.io.read_buf(&mut self.read_buf).await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by the server",
                )
                .into());
            }

            let inbox = &mut self.inbox;
            self.parser.parse(&self.read_buf, |message| inbox.push_back(message))?;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ErrorKind, postgres::{TransactionStatus, frontend}};

    #[tokio::test]
    async fn round_trip() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut stream = PgStream::new(client);

        let query = stream.frontend().query("SELECT 1");
        stream.send(query);
        stream.send(frontend::sync());
        stream.flush().await.unwrap();

        let mut received = [0u8; 19];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"Q\0\0\0\x0dSELECT 1\0S\0\0\0\x04");

        server.write_all(b"I\0\0\0\x04Z\0\0").await.unwrap();
        server.write_all(b"\0\x05T").await.unwrap();

        assert!(matches!(stream.recv().await.unwrap(), BackendMessage::EmptyQuery));
        let BackendMessage::ReadyForQuery(ready) = stream.recv().await.unwrap() else { panic!() };
        assert_eq!(ready.status, TransactionStatus::InTransaction);
    }

    #[tokio::test]
    async fn eof() {
        let (client, server) = tokio::io::duplex(64);
        let mut stream = PgStream::new(client);
        drop(server);

        let err = stream.recv().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }
}
