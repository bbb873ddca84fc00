//! Two-party signaling relay and the peer-side negotiation that runs over it.
//!
//! One sender and one receiver connect to the relay, say which role they
//! play, and the relay forwards offers, answers and ICE candidates between
//! them. The [`peer`] module holds the matching publisher and subscriber.

pub mod config;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;
