use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use uplift_core::{MatchInfo, ParticipantId, Role};

/// A participant waiting in one of the role queues.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub priority_score: f64,
    /// FIFO key. Never changes while the entry lives.
    pub enqueued_at: Instant,
    /// Liveness key the TTL applies to.
    pub last_seen: Instant,
}

/// One-shot mailbox for a participant popped by someone else's call.
#[derive(Debug, Clone)]
pub struct PendingMatch {
    pub for_participant_id: ParticipantId,
    pub partner_id: ParticipantId,
    pub partner_role: Role,
    pub partner_display_name: String,
    pub score: f64,
    pub created_at: Instant,
}

impl PendingMatch {
    fn into_info(self) -> MatchInfo {
        MatchInfo {
            partner_id: self.partner_id,
            partner_role: self.partner_role,
            partner_display_name: self.partner_display_name,
            score: self.score,
        }
    }
}

/// Both members of a freshly produced match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRecord {
    pub seeker: ParticipantId,
    pub responder: ParticipantId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    Matched(MatchInfo),
    Queued { position: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Matched(MatchInfo),
    StillWaiting { position: usize },
    NotQueued,
    Expired,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted_entries: Vec<ParticipantId>,
    pub evicted_matches: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub seekers: usize,
    pub responders: usize,
    pub pending: usize,
}

/// Role-partitioned waiting pools plus the PendingMatch map.
///
/// Not synchronised on its own: the queue actor is its only owner, which makes every
/// pop-and-match sequence atomic with respect to other callers and to the sweep.
#[derive(Debug)]
pub struct QueueBook {
    ttl: Duration,
    seekers: VecDeque<QueueEntry>,
    responders: VecDeque<QueueEntry>,
    pending: HashMap<ParticipantId, PendingMatch>,
    /// Which queue a participant currently sits in.
    index: HashMap<ParticipantId, Role>,
    /// Recently evicted participants, so a late poll can tell expiry from absence.
    evicted: HashMap<ParticipantId, Instant>,
}

impl QueueBook {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seekers: VecDeque::new(),
            responders: VecDeque::new(),
            pending: HashMap::new(),
            index: HashMap::new(),
            evicted: HashMap::new(),
        }
    }

    pub fn enqueue(
        &mut self,
        participant_id: ParticipantId,
        role: Role,
        display_name: String,
        priority_score: f64,
        now: Instant,
    ) -> (EnqueueOutcome, Option<MatchRecord>) {
        self.evicted.remove(&participant_id);

        if let Some(pending) = self.pending.remove(&participant_id) {
            return (EnqueueOutcome::Matched(pending.into_info()), None);
        }

        match self.index.get(&participant_id).copied() {
            Some(queued_role) if queued_role == role => {
                if let Some(entry) = self.entry_mut(participant_id, role) {
                    entry.last_seen = now;
                    entry.display_name = display_name.clone();
                    entry.priority_score = priority_score;
                }
            }
            Some(queued_role) => {
                self.remove_entry(participant_id, queued_role);
            }
            None => {}
        }

        if let Some(partner) = self.pop_live(role.opposite(), now) {
            self.remove_entry(participant_id, role);
            let (info, record) =
                self.pair(participant_id, role, display_name, priority_score, partner, now);
            return (EnqueueOutcome::Matched(info), Some(record));
        }

        if !self.index.contains_key(&participant_id) {
            self.queue_mut(role).push_back(QueueEntry {
                participant_id,
                display_name,
                priority_score,
                enqueued_at: now,
                last_seen: now,
            });
            self.index.insert(participant_id, role);
        }

        let position = self.position(participant_id).unwrap_or_default();
        (EnqueueOutcome::Queued { position }, None)
    }

    pub fn poll(
        &mut self,
        participant_id: ParticipantId,
        now: Instant,
    ) -> (PollOutcome, Option<MatchRecord>) {
        if let Some(pending) = self.pending.remove(&participant_id) {
            return (PollOutcome::Matched(pending.into_info()), None);
        }

        let Some(role) = self.index.get(&participant_id).copied() else {
            let outcome = if self.evicted.remove(&participant_id).is_some() {
                PollOutcome::Expired
            } else {
                PollOutcome::NotQueued
            };
            return (outcome, None);
        };

        let ttl = self.ttl;
        let Some(entry) = self.entry_mut(participant_id, role) else {
            self.index.remove(&participant_id);
            return (PollOutcome::NotQueued, None);
        };

        if now.duration_since(entry.last_seen) > ttl {
            self.remove_entry(participant_id, role);
            return (PollOutcome::Expired, None);
        }
        entry.last_seen = now;
        let display_name = entry.display_name.clone();
        let priority_score = entry.priority_score;

        if let Some(partner) = self.pop_live(role.opposite(), now) {
            self.remove_entry(participant_id, role);
            let (info, record) =
                self.pair(participant_id, role, display_name, priority_score, partner, now);
            return (PollOutcome::Matched(info), Some(record));
        }

        let position = self.position(participant_id).unwrap_or_default();
        (PollOutcome::StillWaiting { position }, None)
    }

    /// Removes any entry and pending match for the participant. Idempotent.
    pub fn cancel(&mut self, participant_id: ParticipantId) -> bool {
        let had_pending = self.pending.remove(&participant_id).is_some();
        let had_entry = match self.index.get(&participant_id).copied() {
            Some(role) => self.remove_entry(participant_id, role),
            None => false,
        };
        self.evicted.remove(&participant_id);
        had_pending || had_entry
    }

    pub fn sweep(&mut self, now: Instant) -> SweepReport {
        let ttl = self.ttl;
        let mut report = SweepReport::default();

        for role in [Role::Seeker, Role::Responder] {
            let queue = match role {
                Role::Seeker => &mut self.seekers,
                Role::Responder => &mut self.responders,
            };
            queue.retain(|entry| {
                let live = now.duration_since(entry.last_seen) <= ttl;
                if !live {
                    report.evicted_entries.push(entry.participant_id);
                }
                live
            });
        }

        for id in &report.evicted_entries {
            self.index.remove(id);
            self.evicted.insert(*id, now);
        }

        let before = self.pending.len();
        self.pending
            .retain(|_, pending| now.duration_since(pending.created_at) <= ttl);
        report.evicted_matches = before - self.pending.len();

        self.evicted
            .retain(|_, at| now.duration_since(*at) <= ttl);

        report
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            seekers: self.seekers.len(),
            responders: self.responders.len(),
            pending: self.pending.len(),
        }
    }

    pub fn is_queued(&self, participant_id: ParticipantId) -> bool {
        self.index.contains_key(&participant_id)
    }

    pub fn has_pending(&self, participant_id: ParticipantId) -> bool {
        self.pending.contains_key(&participant_id)
    }

    /// 1-based position within the participant's role queue.
    pub fn position(&self, participant_id: ParticipantId) -> Option<usize> {
        let role = self.index.get(&participant_id)?;
        self.queue(*role)
            .iter()
            .position(|e| e.participant_id == participant_id)
            .map(|p| p + 1)
    }

    /// Earliest-enqueued live entry of `role`. Expired entries met on the way are evicted.
    fn pop_live(&mut self, role: Role, now: Instant) -> Option<QueueEntry> {
        let ttl = self.ttl;
        while let Some(entry) = self.queue_mut(role).pop_front() {
            self.index.remove(&entry.participant_id);
            if now.duration_since(entry.last_seen) > ttl {
                self.evicted.insert(entry.participant_id, now);
                continue;
            }
            return Some(entry);
        }
        None
    }

    fn pair(
        &mut self,
        caller_id: ParticipantId,
        caller_role: Role,
        caller_name: String,
        caller_score: f64,
        partner: QueueEntry,
        now: Instant,
    ) -> (MatchInfo, MatchRecord) {
        debug_assert!(!self.pending.contains_key(&partner.participant_id));

        self.pending.insert(
            partner.participant_id,
            PendingMatch {
                for_participant_id: partner.participant_id,
                partner_id: caller_id,
                partner_role: caller_role,
                partner_display_name: caller_name,
                score: caller_score,
                created_at: now,
            },
        );

        let record = match caller_role {
            Role::Seeker => MatchRecord {
                seeker: caller_id,
                responder: partner.participant_id,
            },
            Role::Responder => MatchRecord {
                seeker: partner.participant_id,
                responder: caller_id,
            },
        };

        let info = MatchInfo {
            partner_id: partner.participant_id,
            partner_role: caller_role.opposite(),
            partner_display_name: partner.display_name,
            score: partner.priority_score,
        };

        (info, record)
    }

    fn remove_entry(&mut self, participant_id: ParticipantId, role: Role) -> bool {
        self.index.remove(&participant_id);
        let queue = self.queue_mut(role);
        let before = queue.len();
        queue.retain(|e| e.participant_id != participant_id);
        before != queue.len()
    }

    fn entry_mut(&mut self, participant_id: ParticipantId, role: Role) -> Option<&mut QueueEntry> {
        self.queue_mut(role)
            .iter_mut()
            .find(|e| e.participant_id == participant_id)
    }

    fn queue(&self, role: Role) -> &VecDeque<QueueEntry> {
        match role {
            Role::Seeker => &self.seekers,
            Role::Responder => &self.responders,
        }
    }

    fn queue_mut(&mut self, role: Role) -> &mut VecDeque<QueueEntry> {
        match role {
            Role::Seeker => &mut self.seekers,
            Role::Responder => &mut self.responders,
        }
    }
}
