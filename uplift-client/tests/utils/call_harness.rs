use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uplift_client::{
    CallHandle, ControllerSettings, LocalTrack, MediaKind, PeerController, SessionCoordinator,
    SessionEvent, SessionSetup, SessionStart, Subscription, SubscriptionRegistry, TransportEvent,
    TransportState,
};
use uplift_core::{Feedback, MatchInfo, ParticipantId, Role, ServerSignal, SessionId};

use super::capture_sender::{CaptureSender, SentSignals};
use super::mock_transport::MockTransport;

pub const SESSION_LIMIT: Duration = Duration::from_secs(420);
pub const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const FEEDBACK_TIMEOUT: Duration = Duration::from_secs(600);

pub struct ControllerParts {
    pub controller: PeerController,
    pub transport: Arc<MockTransport>,
    pub sender: Arc<CaptureSender>,
    pub sent: SentSignals,
}

pub fn new_controller(initiator: bool) -> ControllerParts {
    let transport = Arc::new(MockTransport::new());
    let (sender, sent) = CaptureSender::new();
    let controller = PeerController::new(
        ControllerSettings {
            session_id: SessionId::new(),
            partner_id: ParticipantId::new(),
            initiator,
            max_ice_restarts: 1,
        },
        transport.clone(),
        sender.clone(),
    );
    ControllerParts {
        controller,
        transport,
        sender,
        sent,
    }
}

pub fn audio_track() -> LocalTrack {
    LocalTrack::new(MediaKind::Audio, "test")
}

pub fn feedback() -> Feedback {
    Feedback {
        mood_before: 2,
        mood_after: 4,
        rating: 5,
        text: Some("thank you".to_string()),
        misconduct_flag: false,
    }
}

/// A session coordinator running over a mock transport and a local registry.
pub struct CallHarness {
    pub session_id: SessionId,
    pub role: Role,
    pub transport: Arc<MockTransport>,
    pub sender: Arc<CaptureSender>,
    pub sent: SentSignals,
    pub registry: Arc<SubscriptionRegistry>,
    pub transport_tx: mpsc::Sender<TransportEvent>,
    pub handle: CallHandle,
}

impl CallHarness {
    pub async fn seeker() -> Self {
        Self::start(Role::Seeker, SessionStart::Offer).await
    }

    pub async fn responder() -> Self {
        Self::start(
            Role::Responder,
            SessionStart::Answer {
                sdp_offer: "remote-offer".to_string(),
            },
        )
        .await
    }

    pub async fn start(role: Role, start: SessionStart) -> Self {
        let session_id = SessionId::new();
        let partner_id = ParticipantId::new();
        let transport = Arc::new(MockTransport::new());
        let (sender, sent) = CaptureSender::new();
        let registry = Arc::new(SubscriptionRegistry::new());
        let subscription = Subscription::new(Arc::clone(&registry), session_id);

        let mut controller = PeerController::new(
            ControllerSettings {
                session_id,
                partner_id,
                initiator: role == Role::Seeker,
                max_ice_restarts: 1,
            },
            transport.clone(),
            sender.clone(),
        );
        controller.attach_track(audio_track()).await.unwrap();

        let (transport_tx, transport_rx) = mpsc::channel(64);
        let setup = SessionSetup {
            session_id,
            role,
            partner_id,
            start,
            session_limit: SESSION_LIMIT,
            negotiation_timeout: NEGOTIATION_TIMEOUT,
            feedback_timeout: FEEDBACK_TIMEOUT,
        };
        let (coordinator, channels) = SessionCoordinator::new(
            setup,
            controller,
            sender.clone(),
            subscription,
            transport_rx,
        );
        let partner = MatchInfo {
            partner_id,
            partner_role: role.opposite(),
            partner_display_name: "Partner".to_string(),
            score: 0.0,
        };
        let handle = CallHandle::spawn(
            coordinator,
            channels,
            session_id,
            partner,
            Duration::from_secs(5),
        );

        Self {
            session_id,
            role,
            transport,
            sender,
            sent,
            registry,
            transport_tx,
            handle,
        }
    }

    /// Routes a relay signal to the session. False once the session stopped listening.
    pub fn deliver(&self, signal: ServerSignal) -> bool {
        self.registry.dispatch(self.session_id, signal).is_ok()
    }

    pub async fn transport_event(&self, event: TransportEvent) {
        self.transport_tx.send(event).await.unwrap();
    }

    pub async fn transport_state(&self, state: TransportState) {
        self.transport_event(TransportEvent::StateChanged(state)).await;
    }

    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), self.handle.next_event())
            .await
            .expect("timed out waiting for a session event")
            .expect("session events closed")
    }

    pub async fn expect_event(&mut self, expected: SessionEvent) {
        assert_eq!(self.next_event().await, expected);
    }

    /// Completes negotiation and brings media up both ways.
    pub async fn connect_media(&mut self) {
        if self.role == Role::Seeker {
            self.sent.next_of("offerCall").await;
            assert!(self.deliver(ServerSignal::CallAccepted {
                session_id: self.session_id,
                sdp_answer: "remote-answer".to_string(),
            }));
        } else {
            self.sent.next_of("acceptCall").await;
        }
        self.transport_state(TransportState::Connected).await;
        self.transport_event(TransportEvent::RemoteTrack {
            kind: MediaKind::Audio,
            track_id: "remote-audio".to_string(),
        })
        .await;

        self.expect_event(SessionEvent::Connected).await;
        self.expect_event(SessionEvent::Running {
            limit: SESSION_LIMIT,
        })
        .await;
    }
}
