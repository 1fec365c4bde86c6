use uplift_client::{ControllerEvent, MediaKind, PeerState, SdpKind, TransportEvent, TransportState};
use uplift_core::{ClientSignal, UpliftError};

use crate::utils::{ControllerParts, TransportCall, audio_track, new_controller};

async fn state(parts: &mut ControllerParts, state: TransportState) {
    parts
        .controller
        .on_transport_event(TransportEvent::StateChanged(state))
        .await
        .unwrap();
}

async fn connected_initiator() -> ControllerParts {
    let mut parts = new_controller(true);
    parts.controller.attach_track(audio_track()).await.unwrap();
    parts.controller.start_offer().await.unwrap();
    parts
        .controller
        .on_answer("answer".to_string())
        .await
        .unwrap();
    state(&mut parts, TransportState::Connected).await;
    parts.controller.drain_events();
    parts
}

async fn connected_answerer() -> ControllerParts {
    let mut parts = new_controller(false);
    parts.controller.attach_track(audio_track()).await.unwrap();
    parts
        .controller
        .accept_offer("offer".to_string())
        .await
        .unwrap();
    state(&mut parts, TransportState::Connected).await;
    parts.controller.drain_events();
    parts
}

#[tokio::test]
async fn test_one_ice_restart_then_failure() {
    let mut parts = connected_initiator().await;

    state(&mut parts, TransportState::Failed).await;
    assert_eq!(parts.controller.state(), PeerState::Disconnected);
    assert_eq!(
        parts.controller.drain_events(),
        vec![ControllerEvent::Reconnecting]
    );
    assert_eq!(parts.transport.offers(), vec![false, true]);
    assert!(matches!(
        parts.sender.sent().last(),
        Some(ClientSignal::Renegotiate { sdp_offer, .. }) if sdp_offer == "offer-1"
    ));

    // Repeated reports while reconnecting are not a second attempt.
    state(&mut parts, TransportState::Disconnected).await;
    assert!(parts.controller.drain_events().is_empty());

    parts
        .controller
        .on_remote_answer("restart-answer".to_string())
        .await
        .unwrap();
    state(&mut parts, TransportState::Connected).await;
    assert_eq!(parts.controller.state(), PeerState::Connected);
    assert_eq!(parts.controller.drain_events(), vec![ControllerEvent::Recovered]);

    state(&mut parts, TransportState::Failed).await;
    assert_eq!(parts.controller.state(), PeerState::Failed);
    let events = parts.controller.drain_events();
    assert!(matches!(
        events.as_slice(),
        [ControllerEvent::Failed(UpliftError::NegotiationFailed(_))]
    ));
    assert_eq!(parts.transport.offers(), vec![false, true]);
}

#[tokio::test]
async fn test_answerer_restarts_ice_on_its_own() {
    let mut parts = connected_answerer().await;
    parts.transport.clear();

    state(&mut parts, TransportState::Disconnected).await;
    assert_eq!(
        parts.controller.drain_events(),
        vec![ControllerEvent::Reconnecting]
    );
    assert_eq!(parts.transport.offers(), vec![true]);
    assert!(matches!(
        parts.sender.sent().last(),
        Some(ClientSignal::Renegotiate { .. })
    ));

    parts
        .controller
        .on_remote_answer("restart-answer".to_string())
        .await
        .unwrap();
    state(&mut parts, TransportState::Connected).await;
    assert_eq!(parts.controller.drain_events(), vec![ControllerEvent::Recovered]);
    assert_eq!(parts.transport.offers(), vec![true]);
}

#[tokio::test]
async fn test_simultaneous_restarts_settle_on_the_initiator_offer() {
    let mut parts = connected_answerer().await;
    state(&mut parts, TransportState::Failed).await;
    parts.transport.clear();
    parts.sender.clear();

    parts
        .controller
        .on_remote_offer("initiator-restart".to_string())
        .await
        .unwrap();
    assert_eq!(
        parts.transport.calls(),
        vec![
            TransportCall::Rollback,
            TransportCall::SetRemote(SdpKind::Offer, "initiator-restart".to_string()),
            TransportCall::CreateAnswer,
        ]
    );
    assert_eq!(parts.sender.count("renegotiateAnswer"), 1);
    assert!(!parts.controller.is_renegotiation_pending());

    state(&mut parts, TransportState::Connected).await;
    assert_eq!(
        parts.controller.drain_events(),
        vec![ControllerEvent::Reconnecting, ControllerEvent::Recovered]
    );
    assert!(parts.transport.offers().is_empty());
    assert_eq!(parts.sender.count("renegotiate"), 0);
}

#[tokio::test]
async fn test_failure_before_the_answer_is_terminal() {
    let mut parts = new_controller(true);
    parts.controller.start_offer().await.unwrap();

    state(&mut parts, TransportState::Failed).await;

    assert_eq!(parts.controller.state(), PeerState::Failed);
    assert!(matches!(
        parts.controller.drain_events().as_slice(),
        [ControllerEvent::Failed(_)]
    ));
    assert_eq!(parts.transport.offers(), vec![false]);
}

#[tokio::test]
async fn test_unexpected_transport_close_fails_the_call() {
    let mut parts = connected_initiator().await;

    state(&mut parts, TransportState::Closed).await;

    assert_eq!(parts.controller.state(), PeerState::Failed);
    assert!(matches!(
        parts.controller.drain_events().as_slice(),
        [ControllerEvent::Failed(UpliftError::NegotiationFailed(_))]
    ));
}

#[tokio::test]
async fn test_remote_media_is_reported_once() {
    let mut parts = connected_initiator().await;

    for id in ["a", "b"] {
        parts
            .controller
            .on_transport_event(TransportEvent::RemoteTrack {
                kind: MediaKind::Audio,
                track_id: id.to_string(),
            })
            .await
            .unwrap();
    }

    assert_eq!(
        parts.controller.drain_events(),
        vec![ControllerEvent::RemoteMediaAttached(MediaKind::Audio)]
    );
}
