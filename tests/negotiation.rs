use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use duet_relay::error::{MediaError, NegotiationError, PeerError, SignalingError};
use duet_relay::peer::media::{MediaSource, PlaybackSink};
use duet_relay::peer::{
    ConnectionState, IceCandidate, PeerConnection, PeerEvent, PeerMessage, Publisher,
    RelayMessage, RemoteTrack, SessionDescription, SessionRole, SessionState, SignalingState,
    Subscriber, TrackKind, drive,
};
use tokio::sync::{Notify, mpsc};
use tokio::time::{sleep, timeout};

#[derive(Default)]
struct MockState {
    calls: Vec<&'static str>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    candidates: Vec<IceCandidate>,
    tracks: Vec<String>,
    negotiation_pending: bool,
    signaling: SignalingState,
    connection: ConnectionState,
    closed: bool,
}

/// In-memory peer connection. Rejects descriptions whose sdp is `garbage`
/// and candidates whose text is `bad`. Adding tracks raises one
/// negotiation-needed per pending offer, the way a browser coalesces it.
#[derive(Clone)]
struct MockPeer {
    state: Arc<Mutex<MockState>>,
    events: mpsc::UnboundedSender<PeerEvent<String>>,
}

impl MockPeer {
    fn new() -> (Self, mpsc::UnboundedReceiver<PeerEvent<String>>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::default(),
                events,
            },
            rx,
        )
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

fn failure(what: &str) -> NegotiationError {
    NegotiationError::Backend(format!("{what} rejected"))
}

#[async_trait]
impl PeerConnection for MockPeer {
    type LocalTrack = String;
    type RemoteTrack = String;

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        self.with(|s| {
            s.calls.push("create_offer");
            s.negotiation_pending = false;
        });
        Ok(SessionDescription::offer("OFFER-SDP"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        self.with(|s| {
            s.calls.push("create_answer");
            match s.remote {
                Some(_) => Ok(SessionDescription::answer("ANSWER-SDP")),
                None => Err(failure("answer without remote offer")),
            }
        })
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        self.with(|s| {
            s.calls.push("set_local_description");
            s.signaling = match s.signaling {
                SignalingState::HaveRemoteOffer => SignalingState::Stable,
                _ => SignalingState::HaveLocalOffer,
            };
            s.local = Some(desc);
        });
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        self.with(|s| {
            s.calls.push("set_remote_description");
            if desc.sdp == "garbage" {
                return Err(failure("description"));
            }
            s.signaling = match s.signaling {
                SignalingState::HaveLocalOffer => SignalingState::Stable,
                _ => SignalingState::HaveRemoteOffer,
            };
            s.remote = Some(desc);
            Ok(())
        })
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.with(|s| s.local.clone())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        self.with(|s| {
            if candidate.candidate == "bad" {
                return Err(failure("candidate"));
            }
            s.candidates.push(candidate);
            Ok(())
        })
    }

    async fn add_track(&self, track: String) -> Result<(), NegotiationError> {
        let raise = self.with(|s| {
            s.tracks.push(track);
            !std::mem::replace(&mut s.negotiation_pending, true)
        });
        if raise {
            let _ = self.events.send(PeerEvent::NegotiationNeeded);
        }
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        self.with(|s| s.signaling)
    }

    fn connection_state(&self) -> ConnectionState {
        self.with(|s| s.connection)
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        self.with(|s| {
            s.closed = true;
            s.connection = ConnectionState::Closed;
            s.signaling = SignalingState::Closed;
        });
        Ok(())
    }
}

#[derive(Clone, Default)]
struct FakeCamera {
    deny: bool,
    released: Arc<AtomicBool>,
}

#[async_trait]
impl MediaSource<String> for FakeCamera {
    async fn acquire(&mut self) -> Result<Vec<String>, MediaError> {
        if self.deny {
            return Err(MediaError::PermissionDenied);
        }
        Ok(vec!["mic".to_string(), "camera".to_string()])
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Capture that waits for `gate` before handing out a track, or forever
/// when there is no gate.
#[derive(Clone, Default)]
struct StalledCamera {
    gate: Option<Arc<Notify>>,
    released: Arc<AtomicBool>,
}

#[async_trait]
impl MediaSource<String> for StalledCamera {
    async fn acquire(&mut self) -> Result<Vec<String>, MediaError> {
        match self.gate.clone() {
            Some(gate) => gate.notified().await,
            None => std::future::pending::<()>().await,
        }
        Ok(vec!["mic".to_string()])
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    attached: Arc<Mutex<Vec<(TrackKind, String)>>>,
}

#[async_trait]
impl PlaybackSink<String> for RecordingSink {
    async fn attach(&mut self, track: RemoteTrack<String>) {
        self.attached.lock().unwrap().push((track.kind, track.track));
    }

    fn detach_all(&mut self) {}
}

async fn next(rx: &mut mpsc::UnboundedReceiver<PeerMessage>) -> PeerMessage {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for relay message")
        .expect("outbox closed")
}

fn drain_events<T>(rx: &mut mpsc::UnboundedReceiver<PeerEvent<T>>) -> Vec<PeerEvent<T>> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

async fn eventually(check: impl Fn() -> bool) {
    timeout(Duration::from_secs(1), async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

fn candidate(text: &str) -> IceCandidate {
    IceCandidate::new(text)
}

#[tokio::test]
async fn publisher_offers_once_media_is_attached() {
    let (pc, events) = MockPeer::new();
    let probe = pc.clone();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let camera = FakeCamera::default();
    let released = camera.released.clone();

    let session = tokio::spawn(async move {
        let mut publisher = Publisher::new(pc, out_tx, camera);
        drive(&mut publisher, in_rx, events).await
    });

    assert_eq!(next(&mut out_rx).await, PeerMessage::IdentifyAsSender);
    assert_eq!(
        next(&mut out_rx).await,
        PeerMessage::CreateOffer {
            sdp: SessionDescription::offer("OFFER-SDP")
        }
    );
    assert_eq!(probe.with(|s| s.tracks.clone()), vec!["mic", "camera"]);

    in_tx
        .send(RelayMessage::Answer {
            sdp: SessionDescription::answer("ANSWER-SDP"),
        })
        .unwrap();
    in_tx
        .send(RelayMessage::IceCandidate {
            candidate: Some(candidate("remote-1")),
        })
        .unwrap();

    probe
        .events
        .send(PeerEvent::LocalCandidate(Some(candidate("local-1"))))
        .unwrap();
    probe.events.send(PeerEvent::LocalCandidate(None)).unwrap();
    assert_eq!(
        next(&mut out_rx).await,
        PeerMessage::IceCandidate {
            candidate: candidate("local-1")
        }
    );

    eventually(|| probe.with(|s| s.remote.is_some() && !s.candidates.is_empty())).await;

    probe
        .events
        .send(PeerEvent::ConnectionState(ConnectionState::Connected))
        .unwrap();
    probe
        .events
        .send(PeerEvent::ConnectionState(ConnectionState::Failed))
        .unwrap();

    let end = timeout(Duration::from_secs(1), session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(end, SessionState::Failed);

    probe.with(|s| {
        assert_eq!(s.remote, Some(SessionDescription::answer("ANSWER-SDP")));
        assert_eq!(s.candidates, vec![candidate("remote-1")]);
        assert!(s.closed);
    });
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn denied_camera_stops_before_offer() {
    let (pc, events) = MockPeer::new();
    let probe = pc.clone();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (_in_tx, in_rx) = mpsc::unbounded_channel();
    let camera = FakeCamera {
        deny: true,
        ..Default::default()
    };

    let mut publisher = Publisher::new(pc, out_tx, camera);
    let result = drive(&mut publisher, in_rx, events).await;

    assert!(matches!(
        result,
        Err(PeerError::Media(MediaError::PermissionDenied))
    ));
    assert!(!publisher.is_streaming());
    assert_eq!(out_rx.recv().await, Some(PeerMessage::IdentifyAsSender));
    drop(publisher);
    assert_eq!(out_rx.recv().await, None);
    probe.with(|s| {
        assert!(!s.calls.contains(&"create_offer"));
        assert!(s.closed);
    });
}

#[tokio::test]
async fn relay_loss_cancels_media_acquisition() {
    let (pc, events) = MockPeer::new();
    let probe = pc.clone();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<RelayMessage>();
    let camera = StalledCamera::default();
    let released = camera.released.clone();

    let session = tokio::spawn(async move {
        let mut publisher = Publisher::new(pc, out_tx, camera);
        let result = drive(&mut publisher, in_rx, events).await;
        (result, publisher.status())
    });

    assert_eq!(next(&mut out_rx).await, PeerMessage::IdentifyAsSender);
    sleep(Duration::from_millis(50)).await;
    drop(in_tx);

    let (result, status) = timeout(Duration::from_secs(1), session)
        .await
        .expect("session kept waiting on media")
        .unwrap();
    assert!(matches!(
        result,
        Err(PeerError::Signaling(SignalingError::Closed))
    ));
    assert_eq!(status, ConnectionState::Closed);
    assert!(released.load(Ordering::SeqCst));
    probe.with(|s| {
        assert!(s.closed);
        assert!(s.tracks.is_empty());
        assert!(!s.calls.contains(&"create_offer"));
    });
}

#[tokio::test]
async fn messages_during_media_start_are_replayed() {
    let (pc, events) = MockPeer::new();
    let probe = pc.clone();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let gate = Arc::new(Notify::new());
    let camera = StalledCamera {
        gate: Some(gate.clone()),
        ..Default::default()
    };

    let session = tokio::spawn(async move {
        let mut publisher = Publisher::new(pc, out_tx, camera);
        drive(&mut publisher, in_rx, events).await
    });

    assert_eq!(next(&mut out_rx).await, PeerMessage::IdentifyAsSender);
    for text in ["early-1", "early-2"] {
        in_tx
            .send(RelayMessage::IceCandidate {
                candidate: Some(candidate(text)),
            })
            .unwrap();
    }
    sleep(Duration::from_millis(50)).await;
    assert!(probe.with(|s| s.candidates.is_empty()));

    gate.notify_one();
    assert!(matches!(
        next(&mut out_rx).await,
        PeerMessage::CreateOffer { .. }
    ));
    eventually(|| probe.with(|s| s.candidates.len() == 2)).await;
    assert_eq!(
        probe.with(|s| s.candidates.clone()),
        vec![candidate("early-1"), candidate("early-2")]
    );
    assert_eq!(probe.with(|s| s.tracks.clone()), vec!["mic"]);

    drop(in_tx);
    let end = timeout(Duration::from_secs(1), session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(end, SessionState::Disconnected);
}

#[tokio::test]
async fn publisher_status_follows_connection_until_stopped() {
    let (pc, mut events) = MockPeer::new();
    let probe = pc.clone();
    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let camera = FakeCamera::default();
    let released = camera.released.clone();
    let mut publisher = Publisher::new(pc, out_tx, camera);

    assert_eq!(publisher.status(), ConnectionState::New);
    publisher.begin().await.unwrap();
    for event in drain_events(&mut events) {
        publisher.on_peer_event(event).await;
    }

    probe.with(|s| s.connection = ConnectionState::Connected);
    publisher
        .on_peer_event(PeerEvent::ConnectionState(ConnectionState::Connected))
        .await;
    assert_eq!(publisher.status(), ConnectionState::Connected);
    assert!(publisher.is_streaming());

    publisher.stop().await;
    assert_eq!(publisher.status(), ConnectionState::Closed);
    assert_eq!(publisher.engine().state(), SessionState::Disconnected);
    assert!(!publisher.is_streaming());
    assert!(released.load(Ordering::SeqCst));

    // A late backend report does not revive the status.
    probe.with(|s| s.connection = ConnectionState::Connecting);
    assert_eq!(publisher.status(), ConnectionState::Closed);
}

#[tokio::test]
async fn rejected_answer_leaves_negotiation_stalled() {
    let (pc, mut events) = MockPeer::new();
    let probe = pc.clone();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let mut publisher = Publisher::new(pc, out_tx, FakeCamera::default());

    publisher.begin().await.unwrap();
    for event in drain_events(&mut events) {
        publisher.on_peer_event(event).await;
    }
    assert_eq!(out_rx.try_recv().unwrap(), PeerMessage::IdentifyAsSender);
    assert!(matches!(
        out_rx.try_recv().unwrap(),
        PeerMessage::CreateOffer { .. }
    ));

    publisher
        .on_relay_message(RelayMessage::Answer {
            sdp: SessionDescription::answer("garbage"),
        })
        .await;

    assert_eq!(publisher.engine().state(), SessionState::Negotiating);
    assert_eq!(
        publisher.engine().negotiation_state().signaling,
        SignalingState::HaveLocalOffer
    );
    assert!(out_rx.try_recv().is_err());
    assert_eq!(
        probe
            .with(|s| s.calls.clone())
            .iter()
            .filter(|c| **c == "create_offer")
            .count(),
        1,
        "no retry after the failed answer"
    );
}

#[tokio::test]
async fn subscriber_answers_in_order() {
    let (pc, events) = MockPeer::new();
    let probe = pc.clone();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    let session = tokio::spawn(async move {
        let mut subscriber = Subscriber::new(pc, out_tx, RecordingSink::default());
        drive(&mut subscriber, in_rx, events).await
    });

    assert_eq!(next(&mut out_rx).await, PeerMessage::IdentifyAsReceiver);
    in_tx
        .send(RelayMessage::Offer {
            sdp: SessionDescription::offer("OFFER-SDP"),
        })
        .unwrap();
    assert_eq!(
        next(&mut out_rx).await,
        PeerMessage::CreateAnswer {
            sdp: SessionDescription::answer("ANSWER-SDP")
        }
    );
    assert_eq!(
        probe.with(|s| s.calls.clone()),
        vec!["set_remote_description", "create_answer", "set_local_description"]
    );

    drop(in_tx);
    let end = timeout(Duration::from_secs(1), session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(end, SessionState::Disconnected);
    assert!(probe.with(|s| s.closed));
}

#[tokio::test]
async fn subscriber_keeps_every_track() {
    let (pc, _events) = MockPeer::new();
    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let mut subscriber = Subscriber::new(pc, out_tx, RecordingSink::default());
    subscriber.begin().await.unwrap();

    subscriber
        .on_peer_event(PeerEvent::Track(RemoteTrack {
            kind: TrackKind::Audio,
            id: "a".to_string(),
            track: "audio-track".to_string(),
        }))
        .await;
    subscriber
        .on_peer_event(PeerEvent::Track(RemoteTrack {
            kind: TrackKind::Video,
            id: "v".to_string(),
            track: "video-track".to_string(),
        }))
        .await;

    assert_eq!(
        *subscriber.sink().attached.lock().unwrap(),
        vec![
            (TrackKind::Audio, "audio-track".to_string()),
            (TrackKind::Video, "video-track".to_string()),
        ]
    );
}

#[tokio::test]
async fn bad_remote_candidate_is_not_fatal() {
    let (pc, _events) = MockPeer::new();
    let probe = pc.clone();
    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let mut subscriber = Subscriber::new(pc, out_tx, RecordingSink::default());
    subscriber.begin().await.unwrap();
    subscriber
        .on_relay_message(RelayMessage::Offer {
            sdp: SessionDescription::offer("OFFER-SDP"),
        })
        .await;

    for text in ["bad", "good"] {
        subscriber
            .on_relay_message(RelayMessage::IceCandidate {
                candidate: Some(candidate(text)),
            })
            .await;
    }
    subscriber
        .on_relay_message(RelayMessage::IceCandidate { candidate: None })
        .await;

    assert_eq!(probe.with(|s| s.candidates.clone()), vec![candidate("good")]);
    assert_eq!(subscriber.engine().state(), SessionState::Negotiating);
}

#[tokio::test]
async fn rejected_offer_sends_no_answer() {
    let (pc, _events) = MockPeer::new();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let mut subscriber = Subscriber::new(pc, out_tx, RecordingSink::default());
    subscriber.begin().await.unwrap();
    assert_eq!(out_rx.try_recv().unwrap(), PeerMessage::IdentifyAsReceiver);

    subscriber
        .on_relay_message(RelayMessage::Offer {
            sdp: SessionDescription::offer("garbage"),
        })
        .await;

    assert!(out_rx.try_recv().is_err());
}

#[tokio::test]
async fn disconnected_session_is_terminal() {
    let (pc, _events) = MockPeer::new();
    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let mut subscriber = Subscriber::new(pc, out_tx, RecordingSink::default());
    subscriber.begin().await.unwrap();
    subscriber
        .on_relay_message(RelayMessage::Offer {
            sdp: SessionDescription::offer("OFFER-SDP"),
        })
        .await;
    subscriber
        .on_peer_event(PeerEvent::ConnectionState(ConnectionState::Connected))
        .await;
    subscriber
        .on_peer_event(PeerEvent::ConnectionState(ConnectionState::Disconnected))
        .await;
    assert_eq!(subscriber.engine().state(), SessionState::Disconnected);

    subscriber
        .on_peer_event(PeerEvent::ConnectionState(ConnectionState::Connected))
        .await;
    assert_eq!(subscriber.engine().state(), SessionState::Disconnected);
}
