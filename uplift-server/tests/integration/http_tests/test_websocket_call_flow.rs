use serde_json::json;
use uplift_core::{
    ClientSignal, EndReason, ErrorCode, EnqueueResponse, Feedback, ParticipantId, Role,
    ServerSignal, SessionId,
};

use crate::integration::init_tracing;
use crate::utils::TestServer;

#[tokio::test]
async fn test_matched_pair_completes_a_call() {
    init_tracing();
    let server = TestServer::start().await.unwrap();
    let (s, u) = (ParticipantId::new(), ParticipantId::new());

    let mut seeker = server.connect(s, Role::Seeker, "Sam").await.unwrap();
    let mut responder = server.connect(u, Role::Responder, "Uma").await.unwrap();

    server
        .post(
            "/queue/enqueue",
            &json!({"participantId": s, "role": "seeker", "displayName": "Sam"}),
        )
        .await
        .unwrap();
    let matched: EnqueueResponse = server
        .post(
            "/queue/enqueue",
            &json!({"participantId": u, "role": "responder", "displayName": "Uma"}),
        )
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(matches!(matched, EnqueueResponse::Match { .. }));

    let session_id = SessionId::new();
    seeker
        .send(&ClientSignal::OfferCall {
            to_participant_id: u,
            session_id,
            sdp_offer: "offer".into(),
        })
        .await
        .unwrap();
    assert!(matches!(
        responder.next_non_roster().await.unwrap(),
        ServerSignal::IncomingCall { from_participant_id, .. } if from_participant_id == s
    ));

    responder
        .send(&ClientSignal::AcceptCall {
            session_id,
            sdp_answer: "answer".into(),
        })
        .await
        .unwrap();
    assert!(matches!(
        seeker.next_non_roster().await.unwrap(),
        ServerSignal::CallAccepted { .. }
    ));

    seeker
        .send(&ClientSignal::EndCall { session_id })
        .await
        .unwrap();
    assert_eq!(
        responder.next_non_roster().await.unwrap(),
        ServerSignal::CallEnded {
            session_id,
            reason: EndReason::RemoteEnded
        }
    );

    seeker
        .send(&ClientSignal::Feedback {
            session_id,
            feedback: Feedback {
                mood_before: 1,
                mood_after: 3,
                rating: 4,
                text: None,
                misconduct_flag: false,
            },
        })
        .await
        .unwrap();

    // Feedback has no reply; wait for the sink to see it.
    for _ in 0..50 {
        if !server.sink.events().await.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    let events = server.sink.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].rating, 4);

    seeker.close().await.unwrap();
    responder.close().await.unwrap();
}

#[tokio::test]
async fn test_unknown_message_type_is_rejected() {
    let server = TestServer::start().await.unwrap();
    let id = ParticipantId::new();
    let mut peer = server.connect(id, Role::Seeker, "Sam").await.unwrap();

    peer.send_text(r#"{"type":"teleport","payload":{}}"#)
        .await
        .unwrap();
    match peer.next_non_roster().await.unwrap() {
        ServerSignal::ServerError { code, .. } => assert_eq!(code, ErrorCode::InvalidMessage),
        other => panic!("expected serverError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_frame_must_be_register() {
    let server = TestServer::start().await.unwrap();
    let mut peer = server.connect_raw(ParticipantId::new()).await.unwrap();

    peer.send(&ClientSignal::EndCall {
        session_id: SessionId::new(),
    })
    .await
    .unwrap();

    let frame = peer.next_frame().await.unwrap();
    assert_eq!(frame.seq, 0);
    assert!(matches!(
        frame.signal,
        ServerSignal::ServerError { code: ErrorCode::InvalidMessage, .. }
    ));
}

#[tokio::test]
async fn test_unmatched_offer_gets_server_error() {
    let server = TestServer::start().await.unwrap();
    let (s, u) = (ParticipantId::new(), ParticipantId::new());
    let mut seeker = server.connect(s, Role::Seeker, "Sam").await.unwrap();
    let _responder = server.connect(u, Role::Responder, "Uma").await.unwrap();

    let session_id = SessionId::new();
    seeker
        .send(&ClientSignal::OfferCall {
            to_participant_id: u,
            session_id,
            sdp_offer: "offer".into(),
        })
        .await
        .unwrap();
    match seeker.next_non_roster().await.unwrap() {
        ServerSignal::ServerError {
            code,
            session_id: sid,
            ..
        } => {
            assert_eq!(code, ErrorCode::NotMatched);
            assert_eq!(sid, Some(session_id));
        }
        other => panic!("expected serverError, got {other:?}"),
    }
}
