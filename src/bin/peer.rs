use duet_relay::config::PeerConfig;
use duet_relay::peer::rtc::{DrainingSink, RtcPeer, StaticTrackSource};
use duet_relay::peer::{Publisher, Subscriber, client, drive_until};
use duet_relay::session::Role;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PeerConfig::from_env()?;
    let link = client::connect(&config.relay_url).await?;
    let (peer, events) = RtcPeer::new(&config.ice_servers).await?;

    let stop = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("could not listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    let end = match config.role {
        Role::Sender => {
            let mut publisher = Publisher::new(peer, link.outbox, StaticTrackSource::default());
            let end = drive_until(&mut publisher, link.inbox, events, stop).await?;
            info!("publisher status: {}", publisher.status());
            end
        }
        Role::Receiver => {
            let mut subscriber = Subscriber::new(peer, link.outbox, DrainingSink::default());
            drive_until(&mut subscriber, link.inbox, events, stop).await?
        }
    };

    info!("session ended: {:?}", end);
    Ok(())
}
