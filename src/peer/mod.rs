//! Peer side: the publisher and subscriber roles and the negotiation engine
//! they share.

pub mod client;
pub mod connection;
pub mod driver;
pub mod engine;
pub mod media;
pub mod messages;
pub mod publisher;
pub mod rtc;
pub mod state;
pub mod subscriber;

pub use connection::{PeerConnection, PeerEvent, RemoteTrack, TrackKind};
pub use driver::{SessionRole, drive, drive_until};
pub use engine::NegotiationEngine;
pub use messages::{IceCandidate, PeerMessage, RelayMessage, SdpType, SessionDescription};
pub use publisher::Publisher;
pub use state::{ConnectionState, NegotiationState, SessionEvent, SessionState, SignalingState};
pub use subscriber::Subscriber;
