use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TimerState {
    NotStarted,
    Running { started_at: Instant, deadline: Instant },
    /// Stopped by the cap or by the end of the call.
    Expired { ran_for: Duration },
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerState::NotStarted => f.write_str("notStarted"),
            TimerState::Running { .. } => f.write_str("running"),
            TimerState::Expired { .. } => f.write_str("expired"),
        }
    }
}

/// Session clock. Starts once media flows in both directions.
#[derive(Debug)]
pub struct SessionTimer {
    limit: Duration,
    state: TimerState,
    local_media: bool,
    remote_media: bool,
}

impl SessionTimer {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            state: TimerState::NotStarted,
            local_media: false,
            remote_media: false,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Returns true when this call started the clock.
    pub fn local_media_attached(&mut self, now: Instant) -> bool {
        self.local_media = true;
        self.try_start(now)
    }

    /// Returns true when this call started the clock.
    pub fn remote_media_attached(&mut self, now: Instant) -> bool {
        self.remote_media = true;
        self.try_start(now)
    }

    fn try_start(&mut self, now: Instant) -> bool {
        if self.state != TimerState::NotStarted || !(self.local_media && self.remote_media) {
            return false;
        }
        self.state = TimerState::Running {
            started_at: now,
            deadline: now + self.limit,
        };
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            TimerState::Running { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    pub fn has_started(&self) -> bool {
        !matches!(self.state, TimerState::NotStarted)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline().map(|d| d.saturating_duration_since(now))
    }

    /// Stops a running clock. A clock that never started stays `NotStarted`.
    pub fn stop(&mut self, now: Instant) {
        if let TimerState::Running {
            started_at,
            deadline,
        } = self.state
        {
            let end = now.min(deadline);
            self.state = TimerState::Expired {
                ran_for: end.saturating_duration_since(started_at),
            };
        }
    }

    /// Time spent running, zero if it never started.
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.state {
            TimerState::NotStarted => Duration::ZERO,
            TimerState::Running { started_at, .. } => now.saturating_duration_since(started_at),
            TimerState::Expired { ran_for } => ran_for,
        }
    }
}
