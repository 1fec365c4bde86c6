use crate::queue::QueueStats;
use tokio::sync::oneshot;
use uplift_core::{EnqueueRequest, EnqueueResponse, ParticipantId, PollResponse};

/// Requests handled by the queue actor, one at a time.
#[derive(Debug)]
pub enum QueueCommand {
    Enqueue {
        request: EnqueueRequest,
        reply: oneshot::Sender<EnqueueResponse>,
    },

    Poll {
        participant_id: ParticipantId,
        reply: oneshot::Sender<PollResponse>,
    },

    /// Removes any entry and pending match. Replies whether anything was removed.
    Cancel {
        participant_id: ParticipantId,
        reply: oneshot::Sender<bool>,
    },

    Stats {
        reply: oneshot::Sender<QueueStats>,
    },
}
