use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::PeerError;
use crate::peer::connection::{PeerConnection, PeerEvent};
use crate::peer::driver::{RemoteTrackOf, SessionRole};
use crate::peer::engine::{NegotiationEngine, RelaySender};
use crate::peer::media::PlaybackSink;
use crate::peer::messages::RelayMessage;
use crate::session::Role;

/// Receiving side: answers the publisher's offer and plays what arrives.
pub struct Subscriber<P, K>
where
    P: PeerConnection,
    K: PlaybackSink<P::RemoteTrack>,
{
    engine: NegotiationEngine<P>,
    sink: K,
}

impl<P, K> Subscriber<P, K>
where
    P: PeerConnection,
    K: PlaybackSink<P::RemoteTrack>,
{
    pub fn new(pc: P, relay: RelaySender, sink: K) -> Self {
        Self {
            engine: NegotiationEngine::new(Role::Receiver, pc, relay),
            sink,
        }
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }
}

#[async_trait]
impl<P, K> SessionRole for Subscriber<P, K>
where
    P: PeerConnection,
    K: PlaybackSink<P::RemoteTrack>,
{
    type Peer = P;

    fn engine(&self) -> &NegotiationEngine<P> {
        &self.engine
    }

    async fn begin(&mut self) -> Result<(), PeerError> {
        self.engine.identify()
    }

    async fn on_relay_message(&mut self, msg: RelayMessage) {
        match msg {
            RelayMessage::Offer { sdp } => {
                if let Err(err) = self.engine.answer(sdp).await {
                    error!("error answering offer: {}", err);
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
            RelayMessage::Answer { .. } => warn!("subscriber ignoring unexpected answer"),
        }
    }

    async fn on_peer_event(&mut self, event: PeerEvent<RemoteTrackOf<P>>) {
        match event {
            PeerEvent::Track(track) => {
                info!("received {} track {}", track.kind, track.id);
                self.sink.attach(track).await;
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
            PeerEvent::NegotiationNeeded => debug!("subscriber waits for offers"),
        }
    }

    async fn shutdown(&mut self) {
        self.sink.detach_all();
        if let Err(err) = self.engine.close().await {
            warn!("error closing peer connection: {}", err);
        }
    }
}
