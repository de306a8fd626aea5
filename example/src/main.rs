use tracing::{Instrument, trace_span};
use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use postro_codec::Result;

mod codec;
mod connection;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::Registry::default()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    trace_span!("codec").in_scope(codec::main)?;

    if std::env::var("DATABASE_URL").is_ok() {
        connection::main().instrument(trace_span!("connection")).await?;
    } else {
        tracing::info!("DATABASE_URL not set, skipping live connection");
    }

    Ok(())
}
