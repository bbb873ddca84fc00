//! Negotiation logic shared by both roles.
//!
//! The engine owns the local peer connection and the session state machine,
//! and turns negotiation steps into [`PeerMessage`]s for the relay. Every
//! method either completes its whole sequence or returns the first error,
//! leaving the connection where that step left it. Nothing is retried.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{NegotiationError, PeerError, SignalingError};
use crate::peer::connection::PeerConnection;
use crate::peer::messages::{IceCandidate, PeerMessage, SessionDescription};
use crate::peer::state::{ConnectionState, NegotiationState, SessionEvent, SessionState};
use crate::session::Role;

pub type RelaySender = mpsc::UnboundedSender<PeerMessage>;

pub struct NegotiationEngine<P: PeerConnection> {
    role: Role,
    pc: P,
    state: SessionState,
    relay: RelaySender,
}

impl<P: PeerConnection> NegotiationEngine<P> {
    pub fn new(role: Role, pc: P, relay: RelaySender) -> Self {
        Self {
            role,
            pc,
            state: SessionState::Idle,
            relay,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> &P {
        &self.pc
    }

    pub fn negotiation_state(&self) -> NegotiationState {
        NegotiationState {
            session: self.state,
            signaling: self.pc.signaling_state(),
            connection: self.pc.connection_state(),
        }
    }

    fn transition(&mut self, event: SessionEvent) -> Result<(), NegotiationError> {
        let next = self.state.on(event)?;
        if next != self.state {
            debug!("{} session {:?} -> {:?}", self.role, self.state, next);
            self.state = next;
        }
        Ok(())
    }

    fn send(&self, msg: PeerMessage) -> Result<(), SignalingError> {
        self.relay.send(msg).map_err(|_| SignalingError::Closed)
    }

    pub fn identify(&mut self) -> Result<(), PeerError> {
        self.transition(SessionEvent::Identify)?;
        let msg = match self.role {
            Role::Sender => PeerMessage::IdentifyAsSender,
            Role::Receiver => PeerMessage::IdentifyAsReceiver,
        };
        self.send(msg)?;
        info!("identified to relay as {}", self.role);
        Ok(())
    }

    async fn local_description(&self) -> Result<SessionDescription, NegotiationError> {
        self.pc
            .local_description()
            .await
            .ok_or(NegotiationError::MissingLocalDescription)
    }

    /// Publisher side: create an offer, apply it locally, send it.
    pub async fn offer(&mut self) -> Result<(), PeerError> {
        self.transition(SessionEvent::BeginNegotiation)?;
        let offer = self.pc.create_offer().await?;
        self.pc.set_local_description(offer).await?;
        let local = self.local_description().await?;
        self.send(PeerMessage::CreateOffer { sdp: local })?;
        info!("offer sent");
        Ok(())
    }

    /// Publisher side: apply the subscriber's answer.
    pub async fn accept_answer(&mut self, answer: SessionDescription) -> Result<(), PeerError> {
        self.transition(SessionEvent::BeginNegotiation)?;
        self.pc.set_remote_description(answer).await?;
        info!("remote description set");
        Ok(())
    }

    /// Subscriber side. The remote offer must be in place before an answer
    /// can be created, so the steps run strictly in order.
    pub async fn answer(&mut self, offer: SessionDescription) -> Result<(), PeerError> {
        self.transition(SessionEvent::BeginNegotiation)?;
        self.pc.set_remote_description(offer).await?;
        let answer = self.pc.create_answer().await?;
        self.pc.set_local_description(answer).await?;
        let local = self.local_description().await?;
        self.send(PeerMessage::CreateAnswer { sdp: local })?;
        info!("answer sent");
        Ok(())
    }

    pub async fn add_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        self.pc.add_ice_candidate(candidate).await?;
        debug!("remote ice candidate added");
        Ok(())
    }

    /// Trickles one locally gathered candidate to the other side right away.
    pub fn send_local_candidate(
        &mut self,
        candidate: Option<IceCandidate>,
    ) -> Result<(), SignalingError> {
        match candidate {
            Some(candidate) => {
                debug!("sending ice candidate {}", candidate.candidate);
                self.send(PeerMessage::IceCandidate { candidate })
            }
            None => {
                debug!("ice candidate gathering complete");
                Ok(())
            }
        }
    }

    pub fn on_connection_state(&mut self, state: ConnectionState) -> Result<(), NegotiationError> {
        info!("{} connection state: {}", self.role, state);
        match state.event() {
            Some(event) => self.transition(event),
            None => Ok(()),
        }
    }

    /// Closes the peer connection and ends the session.
    pub async fn close(&mut self) -> Result<(), NegotiationError> {
        let closed = self.pc.close().await;
        if !self.state.is_terminal() {
            self.transition(SessionEvent::Closed)?;
        }
        closed
    }
}
