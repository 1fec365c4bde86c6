use std::time::Duration;
use uplift_core::{ClientSignal, EndReason, ErrorCode, Feedback, Role, ServerSignal};

use crate::utils::{TestPeer, open_call, test_relay};

fn feedback() -> Feedback {
    Feedback {
        mood_before: 2,
        mood_after: 4,
        rating: 5,
        text: Some("thank you".into()),
        misconduct_flag: false,
    }
}

#[tokio::test(start_paused = true)]
async fn test_seeker_feedback_completes_session_once() {
    let (relay, sink) = test_relay();
    let mut seeker = TestPeer::connect(&relay, Role::Seeker).await;
    let mut responder = TestPeer::connect(&relay, Role::Responder).await;
    let session_id = open_call(&relay, &mut seeker, &mut responder).await;

    tokio::time::advance(Duration::from_secs(90)).await;
    relay
        .handle(seeker.id, ClientSignal::EndCall { session_id })
        .await
        .unwrap();
    responder.next().await;

    relay
        .handle(
            seeker.id,
            ClientSignal::Feedback {
                session_id,
                feedback: feedback(),
            },
        )
        .await
        .unwrap();

    let err = relay
        .handle(
            seeker.id,
            ClientSignal::Feedback {
                session_id,
                feedback: feedback(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidTransition);

    let events = sink.events().await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.seeker_id, seeker.id);
    assert_eq!(event.responder_id, responder.id);
    assert_eq!(event.duration_seconds, 90);
    assert_eq!(event.rating, 5);
    assert_eq!(event.feedback_text.as_deref(), Some("thank you"));
}

#[tokio::test]
async fn test_feedback_during_call_ends_it_first() {
    let (relay, sink) = test_relay();
    let mut seeker = TestPeer::connect(&relay, Role::Seeker).await;
    let mut responder = TestPeer::connect(&relay, Role::Responder).await;
    let session_id = open_call(&relay, &mut seeker, &mut responder).await;

    relay
        .handle(
            seeker.id,
            ClientSignal::Feedback {
                session_id,
                feedback: feedback(),
            },
        )
        .await
        .unwrap();

    assert_eq!(
        responder.next().await,
        ServerSignal::CallEnded {
            session_id,
            reason: EndReason::RemoteEnded
        }
    );
    assert_eq!(sink.events().await.len(), 1);
}

#[tokio::test]
async fn test_responder_and_invalid_feedback_are_rejected() {
    let (relay, sink) = test_relay();
    let mut seeker = TestPeer::connect(&relay, Role::Seeker).await;
    let mut responder = TestPeer::connect(&relay, Role::Responder).await;
    let session_id = open_call(&relay, &mut seeker, &mut responder).await;

    let err = relay
        .handle(
            responder.id,
            ClientSignal::Feedback {
                session_id,
                feedback: feedback(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMessage);

    let mut bad = feedback();
    bad.rating = 9;
    let err = relay
        .handle(
            seeker.id,
            ClientSignal::Feedback {
                session_id,
                feedback: bad,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidFeedback);

    assert!(sink.events().await.is_empty());
    assert!(relay.session_of(seeker.id).is_some(), "rejected feedback leaves the call up");
}
