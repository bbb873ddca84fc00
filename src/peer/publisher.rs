use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::{MediaError, PeerError};
use crate::peer::connection::{PeerConnection, PeerEvent};
use crate::peer::driver::{RemoteTrackOf, SessionRole};
use crate::peer::engine::{NegotiationEngine, RelaySender};
use crate::peer::media::MediaSource;
use crate::peer::messages::RelayMessage;
use crate::peer::state::{ConnectionState, SessionState};
use crate::session::Role;

/// Sending side: captures local media and originates the offer.
pub struct Publisher<P, S>
where
    P: PeerConnection,
    S: MediaSource<P::LocalTrack>,
{
    engine: NegotiationEngine<P>,
    source: S,
    streaming: bool,
}

impl<P, S> Publisher<P, S>
where
    P: PeerConnection,
    S: MediaSource<P::LocalTrack>,
{
    pub fn new(pc: P, relay: RelaySender, source: S) -> Self {
        Self {
            engine: NegotiationEngine::new(Role::Sender, pc, relay),
            source,
            streaming: false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// The connection status shown to whoever runs the publisher. Once
    /// [`Publisher::stop`] has run this reads `Closed`, whatever the backend
    /// still reports.
    pub fn status(&self) -> ConnectionState {
        match self.engine.state() {
            SessionState::Disconnected => ConnectionState::Closed,
            SessionState::Failed => ConnectionState::Failed,
            _ => self.engine.peer().connection_state(),
        }
    }

    /// Acquires local media and adds every track to the connection, which
    /// in turn asks for negotiation. A capture failure is returned as is and
    /// no offer is made.
    pub async fn start(&mut self) -> Result<(), PeerError> {
        let tracks = match self.source.acquire().await {
            Ok(tracks) => tracks,
            Err(err) => {
                error!("could not access camera or microphone: {}", err);
                return Err(err.into());
            }
        };
        for track in tracks {
            self.engine
                .peer()
                .add_track(track)
                .await
                .map_err(MediaError::Attach)?;
        }
        self.streaming = true;
        info!("local media attached");
        Ok(())
    }

    /// Stops every local track and closes the connection.
    pub async fn stop(&mut self) {
        self.source.release();
        self.streaming = false;
        if let Err(err) = self.engine.close().await {
            warn!("error closing peer connection: {}", err);
        }
    }
}

#[async_trait]
impl<P, S> SessionRole for Publisher<P, S>
where
    P: PeerConnection,
    S: MediaSource<P::LocalTrack>,
{
    type Peer = P;

    fn engine(&self) -> &NegotiationEngine<P> {
        &self.engine
    }

    async fn begin(&mut self) -> Result<(), PeerError> {
        self.engine.identify()?;
        self.start().await
    }

    async fn on_relay_message(&mut self, msg: RelayMessage) {
        match msg {
            RelayMessage::Answer { sdp } => {
                if let Err(err) = self.engine.accept_answer(sdp).await {
                    error!("error setting remote description: {}", err);
                }
            }
            RelayMessage::IceCandidate {
                candidate: Some(candidate),
            } => {
                if let Err(err) = self.engine.add_remote_candidate(candidate).await {
                    warn!("error adding ice candidate: {}", err);
                }
            }
            RelayMessage::IceCandidate { candidate: None } => {
                debug!("ignoring empty ice candidate");
            }
            RelayMessage::Offer { .. } => warn!("publisher ignoring unexpected offer"),
        }
    }

    async fn on_peer_event(&mut self, event: PeerEvent<RemoteTrackOf<P>>) {
        match event {
            PeerEvent::NegotiationNeeded => {
                info!("negotiation needed");
                if let Err(err) = self.engine.offer().await {
                    error!("error during negotiation: {}", err);
                }
            }
            PeerEvent::LocalCandidate(candidate) => {
                if let Err(err) = self.engine.send_local_candidate(candidate) {
                    warn!("could not send ice candidate: {}", err);
                }
            }
            PeerEvent::ConnectionState(state) => {
                if let Err(err) = self.engine.on_connection_state(state) {
                    debug!("{}", err);
                }
            }
            PeerEvent::Track(track) => debug!("publisher ignoring remote {} track", track.kind),
        }
    }

    async fn shutdown(&mut self) {
        self.stop().await;
    }
}
