mod connection;
mod control;
mod fleet;
mod ids;
mod session;

use control::ControlService;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let listen = std::env::var("CONTROL_LISTEN").unwrap_or_else(|_| "0.0.0.0:8081".into());
    let listener = TcpListener::bind(&listen).await?;

    let service = Arc::new(ControlService::new());
    connection::serve(listener, service).await
}
