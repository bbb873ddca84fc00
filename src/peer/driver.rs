//! Runs one role to completion.
//!
//! Relay messages and peer connection events are handled one at a time on
//! a single task, each awaited to the end before the next is taken. That
//! sequencing is what keeps two negotiation steps from overlapping on the
//! same connection.

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{PeerError, SignalingError};
use crate::peer::connection::{PeerConnection, PeerEvent};
use crate::peer::engine::NegotiationEngine;
use crate::peer::messages::RelayMessage;
use crate::peer::state::SessionState;

pub type RemoteTrackOf<P> = <P as PeerConnection>::RemoteTrack;

#[async_trait]
pub trait SessionRole: Send {
    type Peer: PeerConnection;

    fn engine(&self) -> &NegotiationEngine<Self::Peer>;

    /// Identify to the relay and do whatever the role needs before it can
    /// react to messages.
    async fn begin(&mut self) -> Result<(), PeerError>;

    async fn on_relay_message(&mut self, msg: RelayMessage);

    async fn on_peer_event(&mut self, event: PeerEvent<RemoteTrackOf<Self::Peer>>);

    /// Releases local media and closes the peer connection.
    async fn shutdown(&mut self);
}

pub async fn drive<R: SessionRole>(
    role: &mut R,
    inbox: mpsc::UnboundedReceiver<RelayMessage>,
    events: mpsc::UnboundedReceiver<PeerEvent<RemoteTrackOf<R::Peer>>>,
) -> Result<SessionState, PeerError> {
    drive_until(role, inbox, events, std::future::pending::<()>()).await
}

/// Like [`drive`], but also stops when `stop` resolves (for example on
/// Ctrl-C). Every exit path goes through [`SessionRole::shutdown`].
pub async fn drive_until<R, F>(
    role: &mut R,
    mut inbox: mpsc::UnboundedReceiver<RelayMessage>,
    mut events: mpsc::UnboundedReceiver<PeerEvent<RemoteTrackOf<R::Peer>>>,
    stop: F,
) -> Result<SessionState, PeerError>
where
    R: SessionRole,
    F: Future<Output = ()>,
{
    tokio::pin!(stop);

    // Messages that show up while `begin` is still waiting on media are held
    // and replayed afterwards; a closed relay or `stop` cancels the wait.
    let mut held = Vec::new();
    let started = tokio::select! {
        res = role.begin() => res,
        _ = hold_until_closed(&mut inbox, &mut held) => Err(PeerError::from(SignalingError::Closed)),
        _ = &mut stop => Err(PeerError::from(SignalingError::Closed)),
    };
    if let Err(err) = started {
        warn!("{} session could not start: {}", role.engine().role(), err);
        role.shutdown().await;
        return Err(err);
    }
    for msg in held {
        role.on_relay_message(msg).await;
    }

    while !role.engine().state().is_terminal() {
        tokio::select! {
            msg = inbox.recv() => match msg {
                Some(msg) => role.on_relay_message(msg).await,
                None => {
                    info!("relay connection closed");
                    break;
                }
            },
            event = events.recv() => match event {
                Some(event) => role.on_peer_event(event).await,
                None => {
                    warn!("peer connection event stream ended");
                    break;
                }
            },
            _ = &mut stop => {
                info!("stopping {} session", role.engine().role());
                break;
            }
        }
    }

    role.shutdown().await;
    Ok(role.engine().state())
}

async fn hold_until_closed(
    inbox: &mut mpsc::UnboundedReceiver<RelayMessage>,
    held: &mut Vec<RelayMessage>,
) {
    while let Some(msg) = inbox.recv().await {
        held.push(msg);
    }
}
