use postro_codec::{
    Config, PgStream, Result,
    postgres::{Authentication, BackendMessage, frontend},
};
use tokio::net::TcpStream;

pub async fn main() -> Result<()> {
    let config = Config::from_env();
    let io = TcpStream::connect((config.host.as_str(), config.port)).await?;
    let mut stream = PgStream::new(io);

    stream.send_startup(&config);

    loop {
        match stream.recv().await? {
            BackendMessage::Authentication(Authentication::CleartextPassword) => {
                let password = config.password.as_deref().unwrap_or_default();
                let frame = stream.frontend().password(password);
                stream.send(frame);
            },
            BackendMessage::Authentication(Authentication::Ok) => {},
            BackendMessage::Authentication(auth) => {
                tracing::warn!("{} is not supported by this example", auth.name());
                return Ok(());
            },
            BackendMessage::Error(err) => return Err(err.into()),
            BackendMessage::ReadyForQuery(ready) => {
                tracing::info!(status = %ready.status.as_char(), "ready");
                break;
            },
            message => tracing::debug!(name = message.name(), "startup"),
        }
    }

    let query = stream.frontend().query("SELECT version()");
    stream.send(query);

    loop {
        match stream.recv().await? {
            BackendMessage::DataRow(row) => tracing::info!("{:?}", row.fields),
            BackendMessage::Error(err) => return Err(err.into()),
            BackendMessage::ReadyForQuery(_) => break,
            message => tracing::debug!(name = message.name(), "query"),
        }
    }

    stream.send(frontend::terminate());
    stream.flush().await?;

    Ok(())
}
