use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uplift_core::SessionCompleted;

/// Boundary to the persistence and billing collaborators.
/// The relay calls it exactly once per completed session.
#[async_trait]
pub trait SessionSink: Send + Sync {
    async fn session_completed(&self, event: SessionCompleted);
}

/// Default sink: writes the event to the log.
pub struct LogSessionSink;

#[async_trait]
impl SessionSink for LogSessionSink {
    async fn session_completed(&self, event: SessionCompleted) {
        info!(
            "Session {} completed: seeker {} responder {} lasted {}s rated {}{}",
            event.session_id,
            event.seeker_id,
            event.responder_id,
            event.duration_seconds,
            event.rating,
            if event.misconduct_flag {
                " (misconduct reported)"
            } else {
                ""
            }
        );
    }
}

/// Forwards events into a channel for an out-of-process consumer.
#[derive(Clone)]
pub struct ChannelSessionSink {
    tx: mpsc::UnboundedSender<SessionCompleted>,
}

impl ChannelSessionSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionCompleted>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SessionSink for ChannelSessionSink {
    async fn session_completed(&self, event: SessionCompleted) {
        let session_id = event.session_id;
        if self.tx.send(event).is_err() {
            warn!("SessionCompleted consumer is gone, dropping event for {}", session_id);
        }
    }
}
