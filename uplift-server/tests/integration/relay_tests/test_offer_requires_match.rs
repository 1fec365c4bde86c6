use uplift_core::{ClientSignal, ErrorCode, ParticipantState, Role, ServerSignal, SessionId};

use crate::integration::init_tracing;
use crate::utils::{TestPeer, authorize, test_relay};

#[tokio::test]
async fn test_unmatched_offer_is_rejected() {
    init_tracing();
    let (relay, _sink) = test_relay();
    let seeker = TestPeer::connect(&relay, Role::Seeker).await;
    let mut responder = TestPeer::connect(&relay, Role::Responder).await;

    let err = relay
        .handle(
            seeker.id,
            ClientSignal::OfferCall {
                to_participant_id: responder.id,
                session_id: SessionId::new(),
                sdp_offer: "offer".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotMatched);
    assert!(responder.try_next().is_none());
}

#[tokio::test]
async fn test_matched_offer_reaches_responder() {
    let (relay, _sink) = test_relay();
    let seeker = TestPeer::connect(&relay, Role::Seeker).await;
    let mut responder = TestPeer::connect(&relay, Role::Responder).await;
    authorize(&relay, &seeker, &responder);

    let session_id = SessionId::new();
    relay
        .handle(
            seeker.id,
            ClientSignal::OfferCall {
                to_participant_id: responder.id,
                session_id,
                sdp_offer: "v=0 offer".into(),
            },
        )
        .await
        .unwrap();

    match responder.next().await {
        ServerSignal::IncomingCall {
            from_participant_id,
            session_id: sid,
            sdp_offer,
        } => {
            assert_eq!(from_participant_id, seeker.id);
            assert_eq!(sid, session_id);
            assert_eq!(sdp_offer, "v=0 offer");
        }
        other => panic!("expected incomingCall, got {other:?}"),
    }
    assert_eq!(relay.session_of(seeker.id), Some(session_id));
    assert_eq!(relay.state_of(responder.id), Some(ParticipantState::Negotiating));
    assert!(!relay.is_authorized(seeker.id, responder.id), "authorisation is single use");
}

#[tokio::test]
async fn test_responder_cannot_offer() {
    let (relay, _sink) = test_relay();
    let seeker = TestPeer::connect(&relay, Role::Seeker).await;
    let responder = TestPeer::connect(&relay, Role::Responder).await;
    authorize(&relay, &seeker, &responder);

    let err = relay
        .handle(
            responder.id,
            ClientSignal::OfferCall {
                to_participant_id: seeker.id,
                session_id: SessionId::new(),
                sdp_offer: "offer".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMessage);
}

#[tokio::test]
async fn test_offer_to_disconnected_peer_is_unreachable() {
    let (relay, _sink) = test_relay();
    let seeker = TestPeer::connect(&relay, Role::Seeker).await;
    let responder = TestPeer::connect(&relay, Role::Responder).await;
    authorize(&relay, &seeker, &responder);
    responder.disconnect(&relay);

    let err = relay
        .handle(
            seeker.id,
            ClientSignal::OfferCall {
                to_participant_id: responder.id,
                session_id: SessionId::new(),
                sdp_offer: "offer".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PeerUnreachable);
    assert!(err.code().is_retryable());
}

#[tokio::test]
async fn test_decline_ends_the_session() {
    let (relay, _sink) = test_relay();
    let mut seeker = TestPeer::connect(&relay, Role::Seeker).await;
    let mut responder = TestPeer::connect(&relay, Role::Responder).await;
    authorize(&relay, &seeker, &responder);

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
        .unwrap();
    responder.next().await;

    relay
        .handle(responder.id, ClientSignal::DeclineCall { session_id })
        .await
        .unwrap();
    assert_eq!(
        seeker.next().await,
        ServerSignal::CallDeclined { session_id }
    );
    assert_eq!(relay.session_of(seeker.id), None);
    assert_eq!(relay.state_of(seeker.id), Some(ParticipantState::Idle));

    // A declined call never started, so there is nothing to rate.
    let err = relay
        .handle(
            seeker.id,
            ClientSignal::Feedback {
                session_id,
                feedback: uplift_core::Feedback {
                    mood_before: 2,
                    mood_after: 3,
                    rating: 4,
                    text: None,
                    misconduct_flag: false,
                },
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidTransition);
}
