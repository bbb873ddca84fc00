use thiserror::Error;

use crate::peer::state::{SessionEvent, SessionState};

/// A frame that could not be turned into a [`crate::protocol::SignalingMessage`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("unrecognized message type `{0}`")]
    UnknownType(String),

    #[error("`{kind}` message is missing required field `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("peer connection backend: {0}")]
    Backend(String),

    #[error("no local description after applying one")]
    MissingLocalDescription,

    #[error("cannot apply {event:?} in state {from:?}")]
    InvalidTransition {
        from: SessionState,
        event: SessionEvent,
    },
}

impl From<webrtc::Error> for NegotiationError {
    fn from(err: webrtc::Error) -> Self {
        NegotiationError::Backend(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("no capture device available: {0}")]
    Unavailable(String),

    #[error("permission to capture media was denied")]
    PermissionDenied,

    #[error("could not attach track to peer connection: {0}")]
    Attach(#[source] NegotiationError),
}

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("could not reach relay at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("relay connection closed")]
    Closed,

    #[error("could not encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has invalid value `{value}`")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server stopped: {0}")]
    Serve(#[source] std::io::Error),
}
