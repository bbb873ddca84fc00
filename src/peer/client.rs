//! WebSocket link from a peer to the relay.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::SignalingError;
use crate::peer::messages::{PeerMessage, RelayMessage};

/// Both directions of one relay connection. Dropping `outbox` closes the
/// socket; `inbox` ends when the relay goes away.
pub struct SignalingLink {
    pub outbox: mpsc::UnboundedSender<PeerMessage>,
    pub inbox: mpsc::UnboundedReceiver<RelayMessage>,
}

pub async fn connect(url: &str) -> Result<SignalingLink, SignalingError> {
    info!("connecting to relay at {}", url);
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|source| SignalingError::Connect {
            url: url.to_string(),
            source,
        })?;
    let (mut write, mut read) = ws_stream.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<PeerMessage>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<RelayMessage>();

    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(err) => {
                    error!("could not encode {:?}: {}", msg, err);
                    continue;
                }
            };
            if let Err(err) = write.send(Message::Text(text.into())).await {
                warn!("relay write failed: {}", err);
                break;
            }
        }
        let _ = write.close().await;
        debug!("relay writer finished");
    });

    tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<RelayMessage>(text.as_str()) {
                    Ok(msg) => {
                        if in_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("dropping unreadable relay frame: {}", err),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!("relay connection error: {}", err);
                    break;
                }
            }
        }
        debug!("relay reader finished");
    });

    Ok(SignalingLink {
        outbox: out_tx,
        inbox: in_rx,
    })
}
