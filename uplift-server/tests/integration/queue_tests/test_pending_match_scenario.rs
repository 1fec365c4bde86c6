use std::time::Duration;
use uplift_core::{EnqueueResponse, ParticipantId, PollResponse, Role};

use super::{request, spawn_queue};
use crate::integration::init_tracing;

#[tokio::test(start_paused = true)]
async fn test_seeker_learns_match_through_poll() {
    init_tracing();
    let (queue, observer) = spawn_queue();
    let (s, u) = (ParticipantId::new(), ParticipantId::new());

    let first = queue.enqueue(request(s, Role::Seeker)).await.unwrap();
    assert_eq!(first, EnqueueResponse::Queued { position: 1 });

    tokio::time::advance(Duration::from_secs(2)).await;
    let second = queue.enqueue(request(u, Role::Responder)).await.unwrap();
    assert!(matches!(second, EnqueueResponse::Match { ref partner } if partner.partner_id == s));
    assert_eq!(queue.stats().await.unwrap().pending, 1);

    let poll = queue.poll_status(s).await.unwrap();
    assert!(matches!(poll, PollResponse::Match { ref partner } if partner.partner_id == u));
    assert_eq!(queue.stats().await.unwrap().pending, 0, "consumed exactly once");

    let again = queue.poll_status(s).await.unwrap();
    assert_eq!(again, PollResponse::NotQueued { expired: false });

    let records = observer.records.lock().unwrap().clone();
    assert_eq!(records.len(), 1);
    assert_eq!((records[0].seeker, records[0].responder), (s, u));
}

#[tokio::test]
async fn test_enqueue_with_pending_match_returns_it() {
    let (queue, _observer) = spawn_queue();
    let (s, u) = (ParticipantId::new(), ParticipantId::new());

    queue.enqueue(request(s, Role::Seeker)).await.unwrap();
    queue.enqueue(request(u, Role::Responder)).await.unwrap();

    let response = queue.enqueue(request(s, Role::Seeker)).await.unwrap();
    assert!(matches!(response, EnqueueResponse::Match { partner } if partner.partner_id == u));
    assert_eq!(queue.stats().await.unwrap().seekers, 0, "not re-queued");
}
