use duet_relay::config::RelayConfig;
use duet_relay::error::RelayError;
use duet_relay::relay::Relay;
use duet_relay::server;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from_env()?;
    let listener = TcpListener::bind(&config.addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: config.addr.clone(),
            source,
        })?;

    info!("signaling relay listening on {}", config.addr);
    server::serve(listener, Relay::new(), config.ping_interval).await?;
    Ok(())
}
