use std::fmt;

use crate::error::NegotiationError;

/// Lifecycle of one peer session.
///
/// `Idle → Identified → Negotiating → Connected → (Disconnected | Failed)`.
/// The last two are terminal: recovering needs a new peer connection and a
/// fresh identify, not a transition out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Identified,
    Negotiating,
    Connected,
    Disconnected,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Identify,
    /// A local or remote description exchange started.
    BeginNegotiation,
    TransportConnected,
    TransportDisconnected,
    TransportFailed,
    /// Local shutdown or loss of the relay connection.
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Failed)
    }

    pub fn on(self, event: SessionEvent) -> Result<SessionState, NegotiationError> {
        use SessionEvent as E;
        use SessionState as S;

        let next = match (self, event) {
            (S::Idle, E::Identify) => S::Identified,
            (S::Identified | S::Negotiating, E::BeginNegotiation) => S::Negotiating,
            // Renegotiating over an established transport keeps it established.
            (S::Connected, E::BeginNegotiation) => S::Connected,
            (S::Negotiating | S::Connected, E::TransportConnected) => S::Connected,
            (from, E::TransportDisconnected | E::Closed) if !from.is_terminal() => {
                S::Disconnected
            }
            (from, E::TransportFailed) if !from.is_terminal() => S::Failed,
            (from, event) => return Err(NegotiationError::InvalidTransition { from, event }),
        };
        Ok(next)
    }
}

/// Mirror of the peer connection's connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Session event this transport state implies, if any.
    pub fn event(self) -> Option<SessionEvent> {
        match self {
            ConnectionState::New | ConnectionState::Connecting => None,
            ConnectionState::Connected => Some(SessionEvent::TransportConnected),
            ConnectionState::Disconnected => Some(SessionEvent::TransportDisconnected),
            ConnectionState::Failed => Some(SessionEvent::TransportFailed),
            ConnectionState::Closed => Some(SessionEvent::Closed),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Mirror of the peer connection's signaling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalingState {
    #[default]
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// What a peer knows about its own negotiation. Never sent to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationState {
    pub session: SessionState,
    pub signaling: SignalingState,
    pub connection: ConnectionState,
}
