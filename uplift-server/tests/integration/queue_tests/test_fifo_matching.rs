use std::time::Duration;
use uplift_core::{EnqueueResponse, ParticipantId, Role};

use super::{request, spawn_queue};
use crate::integration::init_tracing;

#[tokio::test(start_paused = true)]
async fn test_seeker_gets_earliest_responder() {
    init_tracing();
    let (queue, _observer) = spawn_queue();
    let (r1, r2, s) = (ParticipantId::new(), ParticipantId::new(), ParticipantId::new());

    queue.enqueue(request(r1, Role::Responder)).await.unwrap();
    tokio::time::advance(Duration::from_secs(1)).await;
    queue.enqueue(request(r2, Role::Responder)).await.unwrap();
    tokio::time::advance(Duration::from_secs(1)).await;

    let response = queue.enqueue(request(s, Role::Seeker)).await.unwrap();
    match response {
        EnqueueResponse::Match { partner } => {
            assert_eq!(partner.partner_id, r1);
            assert_eq!(partner.partner_role, Role::Responder);
        }
        other => panic!("expected a match, got {other:?}"),
    }

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.responders, 1, "r2 keeps waiting");
    assert_eq!(stats.pending, 1, "r1 has a pending match");
}

#[tokio::test]
async fn test_priority_score_does_not_reorder() {
    let (queue, _observer) = spawn_queue();
    let (low, high, s) = (ParticipantId::new(), ParticipantId::new(), ParticipantId::new());

    let mut first = request(low, Role::Responder);
    first.priority_score = 1.0;
    let mut second = request(high, Role::Responder);
    second.priority_score = 5.0;
    queue.enqueue(first).await.unwrap();
    queue.enqueue(second).await.unwrap();

    let response = queue.enqueue(request(s, Role::Seeker)).await.unwrap();
    assert!(matches!(response, EnqueueResponse::Match { partner } if partner.partner_id == low));
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let (queue, _observer) = spawn_queue();
    let r = ParticipantId::new();

    queue.enqueue(request(r, Role::Responder)).await.unwrap();
    assert!(queue.cancel(r).await.unwrap());
    assert!(!queue.cancel(r).await.unwrap());

    let s = ParticipantId::new();
    let response = queue.enqueue(request(s, Role::Seeker)).await.unwrap();
    assert!(matches!(response, EnqueueResponse::Queued { position: 1 }));
}
