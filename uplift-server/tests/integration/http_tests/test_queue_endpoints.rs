use reqwest::StatusCode;
use serde_json::{Value, json};
use uplift_core::{
    CancelResponse, EnqueueResponse, ParticipantId, PollResponse, Role,
};

use crate::integration::init_tracing;
use crate::utils::TestServer;

#[tokio::test]
async fn test_enqueue_poll_cancel_roundtrip() {
    init_tracing();
    let server = TestServer::start().await.unwrap();
    let (s, u) = (ParticipantId::new(), ParticipantId::new());

    let queued: EnqueueResponse = server
        .post(
            "/queue/enqueue",
            &json!({"participantId": s, "role": "hero", "displayName": "Sam"}),
        )
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(queued, EnqueueResponse::Queued { position: 1 });

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
    match matched {
        EnqueueResponse::Match { partner } => {
            assert_eq!(partner.partner_id, s);
            assert_eq!(partner.partner_display_name, "Sam");
        }
        other => panic!("expected match, got {other:?}"),
    }

    let polled: PollResponse = server
        .post("/queue/status", &json!({"participantId": s, "role": "seeker"}))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(matches!(polled, PollResponse::Match { partner } if partner.partner_id == u));

    let cancelled: CancelResponse = server
        .post("/queue/cancel", &json!({"participantId": s}))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(cancelled.ok);
}

#[tokio::test]
async fn test_blank_display_name_is_bad_request() {
    let server = TestServer::start().await.unwrap();
    let response = server
        .post(
            "/queue/enqueue",
            &json!({"participantId": ParticipantId::new(), "role": "seeker", "displayName": "  "}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalidMessage");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_health_reports_queue_and_online() {
    let server = TestServer::start().await.unwrap();
    let r = ParticipantId::new();
    server
        .post(
            "/queue/enqueue",
            &json!({"participantId": r, "role": Role::Responder, "displayName": "Rae"}),
        )
        .await
        .unwrap();
    let _peer = server.connect(r, Role::Responder, "Rae").await.unwrap();

    let body: Value = server
        .http
        .get(server.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queued"], 1);
    assert_eq!(body["online"], 1);
}
