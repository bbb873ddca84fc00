use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::ProtocolError;

/// Frame `type` values understood by the relay.
pub mod kind {
    pub const IDENTIFY_AS_SENDER: &str = "identify-as-sender";
    pub const IDENTIFY_AS_RECEIVER: &str = "identify-as-receiver";
    pub const CREATE_OFFER: &str = "create-offer";
    pub const OFFER: &str = "offer";
    pub const CREATE_ANSWER: &str = "create-answer";
    pub const ANSWER: &str = "answer";
    pub const ICE_CANDIDATE: &str = "iceCandidate";
}

/// JSON value the relay carries without looking at it. Kept as raw text so
/// what goes out is exactly what came in.
pub type Payload = Box<RawValue>;

/// Everything a peer may send to the relay.
#[derive(Debug)]
pub enum SignalingMessage {
    IdentifyAsSender,
    IdentifyAsReceiver,
    Offer { sdp: Payload },
    Answer { sdp: Payload },
    IceCandidate { candidate: Payload },
}

#[derive(Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    sdp: Option<Payload>,
    candidate: Option<Payload>,
}

impl SignalingMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let frame: InboundFrame = serde_json::from_str(text)?;
        match frame.kind.as_str() {
            kind::IDENTIFY_AS_SENDER => Ok(SignalingMessage::IdentifyAsSender),
            kind::IDENTIFY_AS_RECEIVER => Ok(SignalingMessage::IdentifyAsReceiver),
            kind::CREATE_OFFER => Ok(SignalingMessage::Offer {
                sdp: required(frame.sdp, kind::CREATE_OFFER, "sdp")?,
            }),
            kind::CREATE_ANSWER => Ok(SignalingMessage::Answer {
                sdp: required(frame.sdp, kind::CREATE_ANSWER, "sdp")?,
            }),
            kind::ICE_CANDIDATE => Ok(SignalingMessage::IceCandidate {
                candidate: required(frame.candidate, kind::ICE_CANDIDATE, "candidate")?,
            }),
            _ => Err(ProtocolError::UnknownType(frame.kind)),
        }
    }

    /// Wire tag this message arrived with.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::IdentifyAsSender => kind::IDENTIFY_AS_SENDER,
            SignalingMessage::IdentifyAsReceiver => kind::IDENTIFY_AS_RECEIVER,
            SignalingMessage::Offer { .. } => kind::CREATE_OFFER,
            SignalingMessage::Answer { .. } => kind::CREATE_ANSWER,
            SignalingMessage::IceCandidate { .. } => kind::ICE_CANDIDATE,
        }
    }
}

fn required(
    value: Option<Payload>,
    kind: &'static str,
    field: &'static str,
) -> Result<Payload, ProtocolError> {
    value.ok_or(ProtocolError::MissingField { kind, field })
}

/// Frame the relay writes to the peer on the other side.
#[derive(Debug, Serialize)]
pub struct ForwardFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sdp: Option<&'a RawValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidate: Option<&'a RawValue>,
}

impl<'a> ForwardFrame<'a> {
    pub fn offer(sdp: &'a RawValue) -> Self {
        Self {
            kind: kind::OFFER,
            sdp: Some(sdp),
            candidate: None,
        }
    }

    pub fn answer(sdp: &'a RawValue) -> Self {
        Self {
            kind: kind::ANSWER,
            sdp: Some(sdp),
            candidate: None,
        }
    }

    pub fn ice_candidate(candidate: &'a RawValue) -> Self {
        Self {
            kind: kind::ICE_CANDIDATE,
            sdp: None,
            candidate: Some(candidate),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
