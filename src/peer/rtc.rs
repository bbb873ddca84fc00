//! [`PeerConnection`] backed by the `webrtc` crate, plus the media ends the
//! peer binary uses with it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaEngine};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use crate::error::{MediaError, NegotiationError};
use crate::peer::connection::{PeerConnection, PeerEvent, RemoteTrack, TrackKind};
use crate::peer::media::{MediaSource, PlaybackSink};
use crate::peer::messages::{IceCandidate, SdpType, SessionDescription};
use crate::peer::state::{ConnectionState, SignalingState};

pub type LocalRtcTrack = Arc<dyn TrackLocal + Send + Sync>;
pub type RtcEvents = mpsc::UnboundedReceiver<PeerEvent<Arc<TrackRemote>>>;

pub struct RtcPeer {
    pc: Arc<RTCPeerConnection>,
}

impl RtcPeer {
    /// Builds a peer connection and wires its callbacks into an event stream.
    pub async fn new(ice_servers: &[String]) -> Result<(Self, RtcEvents), NegotiationError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: if ice_servers.is_empty() {
                Vec::new()
            } else {
                vec![RTCIceServer {
                    urls: ice_servers.to_vec(),
                    ..Default::default()
                }]
            },
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(config).await?);
        let (tx, rx) = mpsc::unbounded_channel();

        let events = tx.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let candidate = candidate.and_then(|c| match c.to_json() {
                Ok(init) => Some(IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_mline_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                }),
                Err(err) => {
                    warn!("could not serialize local candidate: {}", err);
                    None
                }
            });
            let _ = events.send(PeerEvent::LocalCandidate(candidate));
            Box::pin(async {})
        }));

        let events = tx.clone();
        pc.on_negotiation_needed(Box::new(move || {
            let _ = events.send(PeerEvent::NegotiationNeeded);
            Box::pin(async {})
        }));

        let events = tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let _ = events.send(PeerEvent::ConnectionState(connection_state(state)));
            Box::pin(async {})
        }));

        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            debug!("ice connection state: {}", state);
            Box::pin(async {})
        }));

        let events = tx;
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let kind = match track.kind() {
                RTPCodecType::Audio => Some(TrackKind::Audio),
                RTPCodecType::Video => Some(TrackKind::Video),
                _ => None,
            };
            match kind {
                Some(kind) => {
                    let id = track.id();
                    let _ = events.send(PeerEvent::Track(RemoteTrack { kind, id, track }));
                }
                None => warn!("ignoring track of unknown kind"),
            }
            Box::pin(async {})
        }));

        Ok((Self { pc }, rx))
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, NegotiationError> {
    let rtc = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp)?,
        SdpType::Rollback => {
            return Err(NegotiationError::Backend(
                "rollback descriptions are not supported".to_string(),
            ));
        }
    };
    Ok(rtc)
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription, NegotiationError> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(NegotiationError::Backend(
                "description has no type".to_string(),
            ));
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: desc.sdp,
    })
}

fn connection_state(state: RTCPeerConnectionState) -> ConnectionState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => ConnectionState::New,
        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => ConnectionState::Failed,
        RTCPeerConnectionState::Closed => ConnectionState::Closed,
    }
}

fn signaling_state(state: RTCSignalingState) -> SignalingState {
    match state {
        RTCSignalingState::Unspecified | RTCSignalingState::Stable => SignalingState::Stable,
        RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
        RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
        RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
        RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
        RTCSignalingState::Closed => SignalingState::Closed,
    }
}

#[async_trait]
impl PeerConnection for RtcPeer {
    type LocalTrack = LocalRtcTrack;
    type RemoteTrack = Arc<TrackRemote>;

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        from_rtc(self.pc.create_offer(None).await?)
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        from_rtc(self.pc.create_answer(None).await?)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.pc.local_description().await?;
        from_rtc(desc).ok()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn add_track(&self, track: LocalRtcTrack) -> Result<(), NegotiationError> {
        let sender = self.pc.add_track(track).await?;
        // RTCP has to be read for the interceptors to run.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        signaling_state(self.pc.signaling_state())
    }

    fn connection_state(&self) -> ConnectionState {
        connection_state(self.pc.connection_state())
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        self.pc.close().await?;
        Ok(())
    }
}

/// Publishes one Opus and one VP8 track. The source holds them until
/// released.
#[derive(Default)]
pub struct StaticTrackSource {
    tracks: Vec<Arc<TrackLocalStaticSample>>,
}

#[async_trait]
impl MediaSource<LocalRtcTrack> for StaticTrackSource {
    async fn acquire(&mut self) -> Result<Vec<LocalRtcTrack>, MediaError> {
        let audio = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "duet".to_owned(),
        ));
        let video = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            "duet".to_owned(),
        ));
        self.tracks = vec![audio.clone(), video.clone()];
        Ok(vec![audio as LocalRtcTrack, video as LocalRtcTrack])
    }

    fn release(&mut self) {
        self.tracks.clear();
    }
}

/// Reads every received track to the end and logs how much arrived.
#[derive(Default)]
pub struct DrainingSink {
    readers: Vec<JoinHandle<()>>,
}

#[async_trait]
impl PlaybackSink<Arc<TrackRemote>> for DrainingSink {
    async fn attach(&mut self, track: RemoteTrack<Arc<TrackRemote>>) {
        let RemoteTrack { kind, id, track } = track;
        self.readers.push(tokio::spawn(async move {
            let mut packets: u64 = 0;
            while track.read_rtp().await.is_ok() {
                packets += 1;
                if packets % 500 == 0 {
                    debug!("{} track {}: {} packets", kind, id, packets);
                }
            }
            info!("{} track {} ended after {} packets", kind, id, packets);
        }));
    }

    fn detach_all(&mut self) {
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }
}
