//! Postgres Wire Protocol Codec
//!
//! Composes frontend messages into frames ready to be written, and parses the backend byte stream
//! into typed messages, no matter how the stream is chunked.
//!
//! # Examples
//!
//! Extended query:
//!
//! ```
//! use postro_codec::postgres::{
//!     frontend, BackendMessage, BindConfig, ExecOptions, Param, Parser, ParseQuery, PortalTarget,
//!     Serializer,
//! };
//!
//! let mut ser = Serializer::new();
//! let params = [Param::from(420i32)];
//!
//! let frames = [
//!     ser.parse(ParseQuery { text: "SELECT $1::int4", ..Default::default() }),
//!     ser.bind(BindConfig { values: &params, ..Default::default() }),
//!     ser.describe(PortalTarget::portal("")),
//!     ser.execute(ExecOptions::default()),
//!     frontend::sync(),
//! ];
//!
//! let types = frames.iter().map(|f| f[0]).collect::<Vec<_>>();
//! assert_eq!(types, b"PBDES");
//!
//! let mut parser = Parser::new();
//! let mut messages = vec![];
//! parser.parse(b"1\0\0\0\x042\0\0\0\x04", |m| messages.push(m)).unwrap();
//! assert_eq!(messages, [BackendMessage::ParseComplete, BackendMessage::BindComplete]);
//! ```
//!
//! Over any tokio io, with the `tokio` feature:
//!
//! ```no_run
//! use postro_codec::{Config, PgStream, postgres::BackendMessage};
//! use tokio::io::{AsyncRead, AsyncWrite};
//!
//! async fn startup<IO>(io: IO) -> postro_codec::Result<PgStream<IO>>
//! where
//!     IO: AsyncRead + AsyncWrite + Unpin,
//! {
//!     let mut stream = PgStream::new(io);
//!     stream.send_startup(&Config::from_env());
//!     loop {
//!         match stream.recv().await? {
//!             BackendMessage::ReadyForQuery(_) => return Ok(stream),
//!             BackendMessage::Error(err) => return Err(err.into()),
//!             _ => {},
//!         }
//!     }
//! }
//! ```

mod common;
mod ext;

// Protocol
pub mod postgres;

// Buffer
pub mod buffer;
pub mod frame;

// Session
pub mod config;
#[cfg(feature = "tokio")]
pub mod transport;

mod error;

pub use config::Config;
pub use postgres::{BackendMessage, Parser, Serializer};
#[cfg(feature = "tokio")]
pub use transport::PgStream;
pub use error::{Error, ErrorKind, Result};
