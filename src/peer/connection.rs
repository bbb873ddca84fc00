use std::fmt;

use async_trait::async_trait;

use crate::error::NegotiationError;
use crate::peer::messages::{IceCandidate, SessionDescription};
use crate::peer::state::{ConnectionState, SignalingState};

/// The local peer connection object a [`crate::peer::engine::NegotiationEngine`]
/// drives.
///
/// Implementations are not reentrant for negotiation: callers must not have
/// two description operations in flight on the same connection.
#[async_trait]
pub trait PeerConnection: Send + Sync + 'static {
    type LocalTrack: Send + 'static;
    type RemoteTrack: Send + 'static;

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError>;
    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError>;
    async fn local_description(&self) -> Option<SessionDescription>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError>;

    /// Adding a track is expected to raise [`PeerEvent::NegotiationNeeded`].
    async fn add_track(&self, track: Self::LocalTrack) -> Result<(), NegotiationError>;

    fn signaling_state(&self) -> SignalingState;
    fn connection_state(&self) -> ConnectionState;

    async fn close(&self) -> Result<(), NegotiationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

#[derive(Debug)]
pub struct RemoteTrack<T> {
    pub kind: TrackKind,
    pub id: String,
    pub track: T,
}

/// Things the peer connection reports on its own schedule.
#[derive(Debug)]
pub enum PeerEvent<T> {
    NegotiationNeeded,
    /// `None` marks the end of candidate gathering.
    LocalCandidate(Option<IceCandidate>),
    ConnectionState(ConnectionState),
    Track(RemoteTrack<T>),
}
