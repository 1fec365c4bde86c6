use uplift_client::{ControllerEvent, PeerState};
use uplift_core::{ClientSignal, UpliftError};

use crate::utils::{TransportCall, audio_track, new_controller};

#[tokio::test]
async fn test_close_is_idempotent_and_stops_tracks() {
    let mut parts = new_controller(true);
    let track = audio_track();
    let writer = track.writer();
    parts.controller.attach_track(track).await.unwrap();
    parts.controller.start_offer().await.unwrap();

    parts.controller.close().await;
    parts.controller.close().await;

    assert_eq!(parts.controller.state(), PeerState::Closed);
    assert!(writer.is_stopped());
    assert_eq!(parts.controller.track_count(), 0);
    assert_eq!(parts.transport.count(&TransportCall::Close), 1);
    assert_eq!(parts.controller.drain_events(), vec![ControllerEvent::Closed]);
}

#[tokio::test]
async fn test_closed_controller_rejects_negotiation() {
    let mut parts = new_controller(true);
    parts.controller.start_offer().await.unwrap();
    parts
        .controller
        .on_answer("answer".to_string())
        .await
        .unwrap();
    parts.controller.close().await;

    let err = parts
        .controller
        .on_remote_offer("offer".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, UpliftError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_only_the_initiator_offers() {
    let mut parts = new_controller(false);
    let err = parts.controller.start_offer().await.unwrap_err();
    assert!(matches!(
        err,
        UpliftError::InvalidTransition { action: "offer", .. }
    ));

    let mut parts = new_controller(true);
    let err = parts
        .controller
        .accept_offer("offer".to_string())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UpliftError::InvalidTransition { action: "accept", .. }
    ));
}

#[tokio::test]
async fn test_decline_notifies_and_closes() {
    let mut parts = new_controller(false);
    let track = audio_track();
    let writer = track.writer();
    parts.controller.attach_track(track).await.unwrap();
    let session_id = parts.controller.session_id();

    parts.controller.decline().await.unwrap();

    assert_eq!(
        parts.sender.sent(),
        vec![ClientSignal::DeclineCall { session_id }]
    );
    assert_eq!(parts.controller.state(), PeerState::Closed);
    assert!(writer.is_stopped());
}
