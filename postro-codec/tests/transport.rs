#![cfg(feature = "tokio")]
use postro_codec::{
    Config, ErrorKind, PgStream,
    frame::{startup_frame_len, typed_frame_len},
    postgres::{Authentication, BackendMessage, TransactionStatus, frontend},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Read one frame off the server side using the codec's own boundary detection.
async fn read_frame(server: &mut DuplexStream, buf: &mut Vec<u8>, startup: bool) -> Vec<u8> {
    loop {
        let len = match startup {
            true => startup_frame_len(buf).unwrap(),
            false => typed_frame_len(buf).unwrap(),
        };
        if let Some(len) = len {
            return buf.drain(..len).collect();
        }
        let mut chunk = [0u8; 7];
        let n = server.read(&mut chunk).await.unwrap();
        assert_ne!(n, 0, "client closed");
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[tokio::test]
async fn startup_and_simple_query() {
    let (client, mut server) = tokio::io::duplex(16);

    let server = tokio::spawn(async move {
        let mut buf = vec![];

        let startup = read_frame(&mut server, &mut buf, true).await;
        assert_eq!(&startup[4..8], &[0, 3, 0, 0]);
        assert!(startup.ends_with(b"client_encoding\0UTF8\0\0"));

        server.write_all(b"R\0\0\0\x08\0\0\0\0").await.unwrap();
        server.write_all(b"S\0\0\0\x19server_encoding\0UTF8\0").await.unwrap();
        server.write_all(b"Z\0\0\0\x05I").await.unwrap();

        let query = read_frame(&mut server, &mut buf, false).await;
        assert_eq!(&query[..], b"Q\0\0\0\x0dSELECT 1\0");

        server.write_all(b"T\0\0\0\x21\0\x01?column?\0\0\0\0\0\0\0\0\0\0\x17\0\x04\xff\xff\xff\xff\0\0").await.unwrap();
        server.write_all(b"D\0\0\0\x0b\0\x01\0\0\0\x011").await.unwrap();
        server.write_all(b"C\0\0\0\x0dSELECT 1\0").await.unwrap();
        server.write_all(b"Z\0\0\0\x05I").await.unwrap();

        let terminate = read_frame(&mut server, &mut buf, false).await;
        assert_eq!(&terminate[..], &frontend::terminate()[..]);
    });

    let mut stream = PgStream::new(client);
    stream.send_startup(&Config::parse("postgres://codec@localhost/codec").unwrap());

    let mut startup = vec![];
    loop {
        let message = stream.recv().await.unwrap();
        let done = matches!(message, BackendMessage::ReadyForQuery(_));
        startup.push(message);
        if done {
            break;
        }
    }
    assert!(matches!(startup[0], BackendMessage::Authentication(Authentication::Ok)));
    let BackendMessage::ParameterStatus(status) = &startup[1] else { panic!() };
    assert_eq!((status.name.as_str(), status.value.as_str()), ("server_encoding", "UTF8"));

    let query = stream.frontend().query("SELECT 1");
    stream.send(query);

    let BackendMessage::RowDescription(rows) = stream.recv().await.unwrap() else { panic!() };
    assert_eq!(rows.fields.len(), 1);
    assert!(rows.fields[0].is::<i32>());

    let BackendMessage::DataRow(row) = stream.recv().await.unwrap() else { panic!() };
    assert_eq!(row.fields, [Some("1".to_string())]);

    let BackendMessage::CommandComplete(complete) = stream.recv().await.unwrap() else { panic!() };
    assert_eq!(complete.command(), "SELECT");
    assert_eq!(complete.rows(), Some(1));

    let BackendMessage::ReadyForQuery(ready) = stream.recv().await.unwrap() else { panic!() };
    assert_eq!(ready.status, TransactionStatus::Idle);

    stream.send(frontend::terminate());
    stream.flush().await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn protocol_error_surfaces() {
    let (client, mut server) = tokio::io::duplex(64);
    server.write_all(b"R\0\0\0\x08\0\0\0\x63").await.unwrap();

    let mut stream = PgStream::new(client);
    let err = stream.recv().await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Protocol(_)));
}
