use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uplift_core::{
    ClientSignal, Frame, IceServerConfig, ParticipantId, Role, ServerSignal, SessionId,
};
use uplift_server::{MatchObserver, MatchRecord, PeerProfile, RelaySettings, SignalingRelay};

use super::mock_sink::RecordingSink;

/// Upper bound for a frame that is expected to arrive.
pub const FRAME_TIMEOUT_MS: u64 = 1000;

pub fn relay_settings() -> RelaySettings {
    RelaySettings {
        ice_servers: vec![IceServerConfig::stun("stun:stun.example.org:3478")],
        reconnect_grace: Duration::from_secs(15),
        match_ttl: Duration::from_secs(60),
        feedback_window: Duration::from_secs(600),
        roster_interval: Duration::from_secs(5),
    }
}

pub fn test_relay() -> (SignalingRelay, RecordingSink) {
    let (sink, _rx) = RecordingSink::new();
    let relay = SignalingRelay::new(relay_settings(), Arc::new(sink.clone()));
    (relay, sink)
}

/// A participant bound to the relay through an in-memory channel.
pub struct TestPeer {
    pub id: ParticipantId,
    pub role: Role,
    pub connection_id: u64,
    pub last_seq: u64,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl TestPeer {
    /// Registers and consumes the `registered` + `iceConfig` greeting.
    pub async fn connect(relay: &SignalingRelay, role: Role) -> Self {
        let mut peer = Self::bind(relay, ParticipantId::new(), role);
        peer.expect_greeting().await;
        peer
    }

    pub fn bind(relay: &SignalingRelay, id: ParticipantId, role: Role) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = relay.register(id, profile(role), tx);
        Self {
            id,
            role,
            connection_id,
            last_seq: 0,
            rx,
        }
    }

    /// Re-registers the same identity on a fresh connection.
    pub fn rebind(&mut self, relay: &SignalingRelay) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connection_id = relay.register(self.id, profile(self.role), tx);
        self.rx = rx;
        self.last_seq = 0;
    }

    pub async fn expect_greeting(&mut self) {
        let id = self.id;
        assert!(
            matches!(self.next().await, ServerSignal::Registered { participant_id } if participant_id == id)
        );
        assert!(matches!(self.next().await, ServerSignal::IceConfig { .. }));
    }

    /// Next signal, asserting that sequence numbers keep increasing.
    pub async fn next(&mut self) -> ServerSignal {
        let frame = tokio::time::timeout(Duration::from_millis(FRAME_TIMEOUT_MS), self.rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("relay dropped the connection");
        assert_eq!(frame.seq, self.last_seq + 1, "sequence gap");
        self.last_seq = frame.seq;
        frame.signal
    }

    /// Next signal that is not a roster broadcast.
    pub async fn next_non_roster(&mut self) -> ServerSignal {
        loop {
            match self.next().await {
                ServerSignal::Roster { .. } => continue,
                other => return other,
            }
        }
    }

    pub fn try_next(&mut self) -> Option<ServerSignal> {
        let frame = self.rx.try_recv().ok()?;
        self.last_seq = frame.seq;
        Some(frame.signal)
    }

    pub fn disconnect(&self, relay: &SignalingRelay) {
        relay.disconnect(self.id, self.connection_id);
    }
}

pub fn profile(role: Role) -> PeerProfile {
    PeerProfile {
        display_name: format!("test-{role}"),
        role,
        rating_hint: None,
    }
}

pub fn authorize(relay: &SignalingRelay, seeker: &TestPeer, responder: &TestPeer) {
    relay.on_match(MatchRecord {
        seeker: seeker.id,
        responder: responder.id,
    });
}

/// Drives a matched pair to a connected session.
pub async fn open_call(
    relay: &SignalingRelay,
    seeker: &mut TestPeer,
    responder: &mut TestPeer,
) -> SessionId {
    authorize(relay, seeker, responder);
    let session_id = SessionId::new();

    relay
        .handle(
            seeker.id,
            ClientSignal::OfferCall {
                to_participant_id: responder.id,
                session_id,
                sdp_offer: "offer".into(),
            },
        )
        .await
        .expect("offer rejected");
    assert!(matches!(
        responder.next().await,
        ServerSignal::IncomingCall { session_id: sid, .. } if sid == session_id
    ));

    relay
        .handle(
            responder.id,
            ClientSignal::AcceptCall {
                session_id,
                sdp_answer: "answer".into(),
            },
        )
        .await
        .expect("accept rejected");
    assert!(matches!(
        seeker.next().await,
        ServerSignal::CallAccepted { session_id: sid, .. } if sid == session_id
    ));

    session_id
}

pub fn candidate(session_id: SessionId, text: &str) -> ClientSignal {
    ClientSignal::Candidate {
        session_id,
        candidate: text.to_string(),
    }
}
