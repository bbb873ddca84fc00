//! Typed view of the relay protocol as a peer speaks it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// Session description in the shape browsers put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Peer → relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum PeerMessage {
    #[serde(rename = "identify-as-sender")]
    IdentifyAsSender,
    #[serde(rename = "identify-as-receiver")]
    IdentifyAsReceiver,
    #[serde(rename = "create-offer")]
    CreateOffer { sdp: SessionDescription },
    #[serde(rename = "create-answer")]
    CreateAnswer { sdp: SessionDescription },
    #[serde(rename = "iceCandidate")]
    IceCandidate { candidate: IceCandidate },
}

/// Relay → peer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    #[serde(rename = "offer")]
    Offer { sdp: SessionDescription },
    #[serde(rename = "answer")]
    Answer { sdp: SessionDescription },
    /// `candidate` is optional so a relay that forwards the end-of-candidates
    /// marker as null does not break the link. This crate's relay drops such
    /// frames before they get here.
    #[serde(rename = "iceCandidate")]
    IceCandidate { candidate: Option<IceCandidate> },
}
