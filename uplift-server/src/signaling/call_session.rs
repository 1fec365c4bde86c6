use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uplift_core::{ParticipantId, ServerSignal, SessionId, UpliftError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Offering,
    Answering,
    Connected,
    Failed,
    Ended,
}

impl SessionState {
    fn can_become(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Offering)
                | (Offering, Answering)
                | (Answering, Connected)
                | (Created | Offering | Answering | Connected, Failed | Ended)
                | (Failed, Ended)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Seeker,
    Responder,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::Seeker => 0,
            Side::Responder => 1,
        }
    }
}

/// Relay-side record of one call between a seeker and a responder.
#[derive(Debug)]
pub struct CallSession {
    pub session_id: SessionId,
    pub seeker_id: ParticipantId,
    pub responder_id: ParticipantId,
    pub offerer: ParticipantId,
    pub state: SessionState,
    pub created_at: Instant,
    pub started_at: Option<Instant>,
    /// Signals held for a side whose connection is down, in arrival order.
    buffers: [VecDeque<ServerSignal>; 2],
    /// Grace generation of a side that is currently disconnected, and when it dropped.
    offline: [Option<(u64, Instant)>; 2],
}

impl CallSession {
    pub fn new(
        session_id: SessionId,
        seeker_id: ParticipantId,
        responder_id: ParticipantId,
        offerer: ParticipantId,
        now: Instant,
    ) -> Self {
        Self {
            session_id,
            seeker_id,
            responder_id,
            offerer,
            state: SessionState::Created,
            created_at: now,
            started_at: None,
            buffers: [VecDeque::new(), VecDeque::new()],
            offline: [None, None],
        }
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), UpliftError> {
        if !self.state.can_become(next) {
            return Err(UpliftError::InvalidTransition {
                action: "session transition",
                state: self.state.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn side_of(&self, participant_id: ParticipantId) -> Option<Side> {
        if participant_id == self.seeker_id {
            Some(Side::Seeker)
        } else if participant_id == self.responder_id {
            Some(Side::Responder)
        } else {
            None
        }
    }

    pub fn partner_of(&self, participant_id: ParticipantId) -> Option<ParticipantId> {
        match self.side_of(participant_id)? {
            Side::Seeker => Some(self.responder_id),
            Side::Responder => Some(self.seeker_id),
        }
    }

    pub fn is_member(&self, participant_id: ParticipantId) -> bool {
        self.side_of(participant_id).is_some()
    }

    pub fn members(&self) -> [ParticipantId; 2] {
        [self.seeker_id, self.responder_id]
    }

    pub fn is_offline(&self, side: Side) -> bool {
        self.offline[side.index()].is_some()
    }

    pub fn offline_generation(&self, side: Side) -> Option<u64> {
        self.offline[side.index()].map(|(generation, _)| generation)
    }

    pub fn offline_since(&self, side: Side) -> Option<Instant> {
        self.offline[side.index()].map(|(_, since)| since)
    }

    pub fn mark_offline(&mut self, side: Side, generation: u64, since: Instant) {
        self.offline[side.index()] = Some((generation, since));
    }

    /// Returns true when the side was offline.
    pub fn mark_online(&mut self, side: Side) -> bool {
        self.offline[side.index()].take().is_some()
    }

    pub fn hold(&mut self, side: Side, signal: ServerSignal) {
        self.buffers[side.index()].push_back(signal);
    }

    pub fn take_held(&mut self, side: Side) -> VecDeque<ServerSignal> {
        std::mem::take(&mut self.buffers[side.index()])
    }

    pub fn held_len(&self, side: Side) -> usize {
        self.buffers[side.index()].len()
    }

    pub fn duration(&self, now: Instant) -> Duration {
        self.started_at
            .map(|started| now.duration_since(started))
            .unwrap_or_default()
    }
}

/// A finished session, kept for the feedback window so repeated `endCall`s stay no-ops
/// and the seeker can still send its feedback.
#[derive(Debug, Clone)]
pub struct EndedSession {
    pub session_id: SessionId,
    pub seeker_id: ParticipantId,
    pub responder_id: ParticipantId,
    pub duration: Duration,
    pub ended_at: Instant,
    pub reached_connected: bool,
    pub feedback_received: bool,
}
