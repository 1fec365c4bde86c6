use crate::config::ServerConfig;
use crate::queue::{MatchObserver, MatchRecord};
use crate::signaling::{CallSession, EndedSession, SessionSink, SessionState, Side};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uplift_core::{
    ClientSignal, EndReason, Feedback, Frame, IceServerConfig, ParticipantId, ParticipantState,
    Role, RosterEntry, ServerSignal, SessionCompleted, SessionId, UpliftError,
};

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub ice_servers: Vec<IceServerConfig>,
    pub reconnect_grace: Duration,
    pub match_ttl: Duration,
    pub feedback_window: Duration,
    pub roster_interval: Duration,
}

impl From<&ServerConfig> for RelaySettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            ice_servers: config.ice_servers.clone(),
            reconnect_grace: config.reconnect_grace(),
            match_ttl: config.match_ttl(),
            feedback_window: config.feedback_window(),
            roster_interval: config.roster_interval(),
        }
    }
}

/// What a participant told the relay about itself in `register`.
#[derive(Debug, Clone)]
pub struct PeerProfile {
    pub display_name: String,
    pub role: Role,
    pub rating_hint: Option<f64>,
}

struct Outbound {
    connection_id: u64,
    tx: mpsc::UnboundedSender<Frame>,
    next_seq: u64,
}

struct PeerLink {
    profile: PeerProfile,
    state: ParticipantState,
    outbound: Option<Outbound>,
}

/// End-of-call notice for a member that dropped before its session finished.
struct HeldNotice {
    signal: ServerSignal,
    until: Instant,
}

#[derive(Default)]
struct SessionBook {
    active: HashMap<SessionId, CallSession>,
    by_participant: HashMap<ParticipantId, SessionId>,
    ended: HashMap<SessionId, EndedSession>,
    notices: HashMap<ParticipantId, HeldNotice>,
    grace_generation: u64,
}

/// Unordered pair of participants the queue matched together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PairKey(ParticipantId, ParticipantId);

impl PairKey {
    fn new(a: ParticipantId, b: ParticipantId) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }
}

enum Finish {
    EndedBy(ParticipantId),
    DeclinedBy(ParticipantId),
    LostBy(ParticipantId),
}

struct RelayInner {
    peers: DashMap<ParticipantId, PeerLink>,
    /// Lock order: `sessions` first, then `peers`. Never the other way round.
    sessions: Mutex<SessionBook>,
    authorized: DashMap<PairKey, Instant>,
    sink: Arc<dyn SessionSink>,
    settings: RelaySettings,
    next_connection: AtomicU64,
}

/// Routes signaling between the two members of each call session.
#[derive(Clone)]
pub struct SignalingRelay {
    inner: Arc<RelayInner>,
}

impl SignalingRelay {
    pub fn new(settings: RelaySettings, sink: Arc<dyn SessionSink>) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                peers: DashMap::new(),
                sessions: Mutex::new(SessionBook::default()),
                authorized: DashMap::new(),
                sink,
                settings,
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.settings.ice_servers.clone()
    }

    /// Binds `participant_id` to a new connection and returns the binding id.
    ///
    /// Replaces any previous binding. A participant coming back inside its grace window
    /// gets the signals held for it, in order, and its partner is told it is back. If the
    /// session ended meanwhile it gets the end notice instead.
    pub fn register(
        &self,
        participant_id: ParticipantId,
        profile: PeerProfile,
        tx: mpsc::UnboundedSender<Frame>,
    ) -> u64 {
        let connection_id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let outbound = Outbound {
            connection_id,
            tx,
            next_seq: 1,
        };

        let mut book = self.inner.sessions.lock();

        let replaced = match self.inner.peers.get_mut(&participant_id) {
            Some(mut peer) => {
                peer.profile = profile;
                peer.outbound.replace(outbound).is_some()
            }
            None => {
                self.inner.peers.insert(
                    participant_id,
                    PeerLink {
                        profile,
                        state: ParticipantState::Idle,
                        outbound: Some(outbound),
                    },
                );
                false
            }
        };
        if replaced {
            info!("Participant {} replaced its connection", participant_id);
        } else {
            info!("Participant {} registered", participant_id);
        }

        let _ = self.deliver(participant_id, ServerSignal::Registered { participant_id });
        let _ = self.deliver(
            participant_id,
            ServerSignal::IceConfig {
                ice_servers: self.ice_servers(),
            },
        );

        if let Some(held) = book.notices.remove(&participant_id)
            && held.until >= Instant::now()
        {
            info!("Participant {} missed the end of its session", participant_id);
            let _ = self.deliver(participant_id, held.signal);
        }

        let Some(session_id) = book.by_participant.get(&participant_id).copied() else {
            return connection_id;
        };
        let Some(session) = book.active.get_mut(&session_id) else {
            return connection_id;
        };
        let Some(side) = session.side_of(participant_id) else {
            return connection_id;
        };

        let state = match session.state {
            SessionState::Connected => ParticipantState::Connected,
            _ => ParticipantState::Negotiating,
        };
        self.set_state(participant_id, state);

        if session.mark_online(side) {
            let held = session.take_held(side);
            info!(
                "Participant {} resumed session {} with {} held signals",
                participant_id,
                session_id,
                held.len()
            );
            let mut held = held.into_iter();
            while let Some(signal) = held.next() {
                if let Err(signal) = self.deliver(participant_id, signal) {
                    session.hold(side, signal);
                    held.by_ref().for_each(|rest| session.hold(side, rest));
                    break;
                }
            }

            if let Some(partner) = session.partner_of(participant_id) {
                self.route_in_session(session, partner, ServerSignal::PeerReconnected { session_id });
            }
        }

        connection_id
    }

    /// Drops the binding `connection_id`. Stale bindings are ignored.
    pub fn disconnect(&self, participant_id: ParticipantId, connection_id: u64) {
        let mut book = self.inner.sessions.lock();

        {
            let Some(mut peer) = self.inner.peers.get_mut(&participant_id) else {
                return;
            };
            match &peer.outbound {
                Some(out) if out.connection_id == connection_id => {}
                _ => {
                    debug!(
                        "Ignoring stale disconnect of {} (connection {})",
                        participant_id, connection_id
                    );
                    return;
                }
            }
            peer.outbound = None;
        }

        let Some(session_id) = book.by_participant.get(&participant_id).copied() else {
            self.inner
                .peers
                .remove_if(&participant_id, |_, peer| peer.outbound.is_none());
            info!("Participant {} left", participant_id);
            return;
        };

        book.grace_generation += 1;
        let generation = book.grace_generation;
        let Some(session) = book.active.get_mut(&session_id) else {
            return;
        };
        let Some(side) = session.side_of(participant_id) else {
            return;
        };
        session.mark_offline(side, generation, Instant::now());

        warn!(
            "Participant {} dropped during session {}, holding it for {:?}",
            participant_id, session_id, self.inner.settings.reconnect_grace
        );
        if let Some(partner) = session.partner_of(participant_id) {
            self.route_in_session(session, partner, ServerSignal::PeerReconnecting { session_id });
        }
        drop(book);

        let relay = self.clone();
        let grace = self.inner.settings.reconnect_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            relay.expire_grace(participant_id, session_id, generation);
        });
    }

    fn expire_grace(&self, participant_id: ParticipantId, session_id: SessionId, generation: u64) {
        let mut book = self.inner.sessions.lock();
        self.drop_expired_notice(&mut book, participant_id, Instant::now());

        let still_offline = book
            .active
            .get(&session_id)
            .and_then(|session| {
                let side = session.side_of(participant_id)?;
                session.offline_generation(side)
            })
            .is_some_and(|g| g == generation);
        if !still_offline {
            return;
        }

        warn!(
            "Participant {} did not come back, session {} is lost",
            participant_id, session_id
        );
        self.finish(&mut book, session_id, Finish::LostBy(participant_id));
    }

    /// Applies one signal from a registered participant.
    pub async fn handle(
        &self,
        from: ParticipantId,
        signal: ClientSignal,
    ) -> Result<(), UpliftError> {
        match signal {
            ClientSignal::Register {
                display_name,
                role,
                rating_hint,
            } => {
                if let Some(mut peer) = self.inner.peers.get_mut(&from) {
                    peer.profile = PeerProfile {
                        display_name,
                        role,
                        rating_hint,
                    };
                }
                Ok(())
            }
            ClientSignal::OfferCall {
                to_participant_id,
                session_id,
                sdp_offer,
            } => self.open_session(from, to_participant_id, session_id, sdp_offer),
            ClientSignal::AcceptCall {
                session_id,
                sdp_answer,
            } => self.accept(from, session_id, sdp_answer),
            ClientSignal::DeclineCall { session_id } => self.decline(from, session_id),
            ClientSignal::Candidate {
                session_id,
                candidate,
            } => self.forward(
                from,
                session_id,
                ServerSignal::Candidate {
                    session_id,
                    candidate,
                },
            ),
            ClientSignal::Renegotiate {
                session_id,
                sdp_offer,
            } => self.forward(
                from,
                session_id,
                ServerSignal::Renegotiate {
                    session_id,
                    sdp_offer,
                },
            ),
            ClientSignal::RenegotiateAnswer {
                session_id,
                sdp_answer,
            } => self.forward(
                from,
                session_id,
                ServerSignal::RenegotiateAnswer {
                    session_id,
                    sdp_answer,
                },
            ),
            ClientSignal::EndCall { session_id } => self.end_call(from, session_id),
            ClientSignal::Feedback {
                session_id,
                feedback,
            } => self.feedback(from, session_id, feedback).await,
        }
    }

    fn open_session(
        &self,
        from: ParticipantId,
        to: ParticipantId,
        session_id: SessionId,
        sdp_offer: String,
    ) -> Result<(), UpliftError> {
        let now = Instant::now();
        let key = PairKey::new(from, to);
        let mut book = self.inner.sessions.lock();

        if book.active.contains_key(&session_id) || book.ended.contains_key(&session_id) {
            return Err(UpliftError::InvalidMessage(format!(
                "session id {session_id} is already in use"
            )));
        }

        let from_role = self.inner.peers.get(&from).map(|peer| peer.profile.role);
        if from_role != Some(Role::Seeker) {
            return Err(UpliftError::InvalidMessage(
                "only the seeker offers a call".to_string(),
            ));
        }

        let match_ttl = self.inner.settings.match_ttl;
        let authorized = self
            .inner
            .authorized
            .get(&key)
            .is_some_and(|at| now.duration_since(*at) <= match_ttl);
        if !authorized {
            return Err(UpliftError::NotMatched(from, to));
        }

        let target = self
            .inner
            .peers
            .get(&to)
            .map(|peer| (peer.profile.role, peer.outbound.is_some()));
        match target {
            Some((Role::Responder, true)) => {}
            Some((Role::Seeker, _)) => {
                return Err(UpliftError::InvalidMessage(
                    "both members of a session cannot share a role".to_string(),
                ));
            }
            _ => return Err(UpliftError::PeerUnreachable(to)),
        }

        if book.by_participant.contains_key(&from) {
            return Err(UpliftError::InvalidTransition {
                action: "offerCall",
                state: "inSession".to_string(),
            });
        }
        if book.by_participant.contains_key(&to) {
            return Err(UpliftError::PeerUnreachable(to));
        }

        self.inner.authorized.remove(&key);

        let mut session = CallSession::new(session_id, from, to, from, now);
        session.transition(SessionState::Offering)?;
        self.route_in_session(
            &mut session,
            to,
            ServerSignal::IncomingCall {
                from_participant_id: from,
                session_id,
                sdp_offer,
            },
        );

        book.by_participant.insert(from, session_id);
        book.by_participant.insert(to, session_id);
        book.active.insert(session_id, session);
        self.set_state(from, ParticipantState::Negotiating);
        self.set_state(to, ParticipantState::Negotiating);

        info!("Session {} opened: {} -> {}", session_id, from, to);
        Ok(())
    }

    fn accept(
        &self,
        from: ParticipantId,
        session_id: SessionId,
        sdp_answer: String,
    ) -> Result<(), UpliftError> {
        let mut book = self.inner.sessions.lock();
        let session = book
            .active
            .get_mut(&session_id)
            .ok_or(UpliftError::UnknownSession(session_id))?;
        if !session.is_member(from) {
            return Err(UpliftError::NotInSession(session_id));
        }
        if from == session.offerer {
            return Err(UpliftError::InvalidMessage(
                "the offerer cannot accept its own call".to_string(),
            ));
        }

        session.transition(SessionState::Answering)?;
        let offerer = session.offerer;
        self.route_in_session(
            session,
            offerer,
            ServerSignal::CallAccepted {
                session_id,
                sdp_answer,
            },
        );
        session.transition(SessionState::Connected)?;
        session.started_at = Some(Instant::now());

        for member in session.members() {
            self.set_state(member, ParticipantState::Connected);
        }
        info!("Session {} connected", session_id);
        Ok(())
    }

    fn decline(&self, from: ParticipantId, session_id: SessionId) -> Result<(), UpliftError> {
        let mut book = self.inner.sessions.lock();
        let session = book
            .active
            .get(&session_id)
            .ok_or(UpliftError::UnknownSession(session_id))?;
        if !session.is_member(from) {
            return Err(UpliftError::NotInSession(session_id));
        }
        if from == session.offerer || session.state != SessionState::Offering {
            return Err(UpliftError::InvalidTransition {
                action: "declineCall",
                state: session.state.to_string(),
            });
        }

        self.finish(&mut book, session_id, Finish::DeclinedBy(from));
        Ok(())
    }

    fn forward(
        &self,
        from: ParticipantId,
        session_id: SessionId,
        signal: ServerSignal,
    ) -> Result<(), UpliftError> {
        let mut book = self.inner.sessions.lock();

        let Some(session) = book.active.get_mut(&session_id) else {
            if book.ended.contains_key(&session_id) {
                debug!("Dropping late signal for ended session {}", session_id);
                return Ok(());
            }
            return Err(UpliftError::UnknownSession(session_id));
        };
        let partner = session
            .partner_of(from)
            .ok_or(UpliftError::NotInSession(session_id))?;

        self.route_in_session(session, partner, signal);
        Ok(())
    }

    /// Ends the session for both members. Repeating it is a no-op.
    fn end_call(&self, from: ParticipantId, session_id: SessionId) -> Result<(), UpliftError> {
        let mut book = self.inner.sessions.lock();

        if let Some(session) = book.active.get(&session_id) {
            if !session.is_member(from) {
                return Err(UpliftError::NotInSession(session_id));
            }
            self.finish(&mut book, session_id, Finish::EndedBy(from));
            return Ok(());
        }

        match book.ended.get(&session_id) {
            Some(ended) if ended.seeker_id == from || ended.responder_id == from => {
                debug!("Session {} already ended", session_id);
                Ok(())
            }
            Some(_) => Err(UpliftError::NotInSession(session_id)),
            None => Err(UpliftError::UnknownSession(session_id)),
        }
    }

    async fn feedback(
        &self,
        from: ParticipantId,
        session_id: SessionId,
        feedback: Feedback,
    ) -> Result<(), UpliftError> {
        feedback.validate()?;

        let event = {
            let mut book = self.inner.sessions.lock();

            if let Some(session) = book.active.get(&session_id) {
                match session.side_of(from) {
                    Some(Side::Seeker) => {
                        self.finish(&mut book, session_id, Finish::EndedBy(from));
                    }
                    Some(Side::Responder) => {
                        return Err(UpliftError::InvalidMessage(
                            "only the seeker submits feedback".to_string(),
                        ));
                    }
                    None => return Err(UpliftError::NotInSession(session_id)),
                }
            }

            let ended = book
                .ended
                .get_mut(&session_id)
                .ok_or(UpliftError::UnknownSession(session_id))?;
            if from == ended.responder_id {
                return Err(UpliftError::InvalidMessage(
                    "only the seeker submits feedback".to_string(),
                ));
            }
            if from != ended.seeker_id {
                return Err(UpliftError::NotInSession(session_id));
            }
            if !ended.reached_connected {
                return Err(UpliftError::InvalidTransition {
                    action: "feedback",
                    state: "neverConnected".to_string(),
                });
            }
            if ended.feedback_received {
                return Err(UpliftError::InvalidTransition {
                    action: "feedback",
                    state: "completed".to_string(),
                });
            }
            ended.feedback_received = true;

            SessionCompleted {
                session_id,
                seeker_id: ended.seeker_id,
                responder_id: ended.responder_id,
                duration_seconds: ended.duration.as_secs(),
                rating: feedback.rating,
                mood_before: feedback.mood_before,
                mood_after: feedback.mood_after,
                feedback_text: feedback.text,
                misconduct_flag: feedback.misconduct_flag,
                completed_at: chrono::Utc::now(),
            }
        };

        info!("Feedback received for session {}", session_id);
        self.inner.sink.session_completed(event).await;
        Ok(())
    }

    /// Removes an active session and tells the partner of `finish`'s actor.
    fn finish(&self, book: &mut SessionBook, session_id: SessionId, finish: Finish) {
        let Some(mut session) = book.active.remove(&session_id) else {
            return;
        };
        for member in session.members() {
            book.by_participant.remove(&member);
        }

        let now = Instant::now();
        let (actor, notice, next) = match finish {
            Finish::EndedBy(actor) => (
                actor,
                ServerSignal::CallEnded {
                    session_id,
                    reason: EndReason::RemoteEnded,
                },
                SessionState::Ended,
            ),
            Finish::DeclinedBy(actor) => (
                actor,
                ServerSignal::CallDeclined { session_id },
                SessionState::Ended,
            ),
            Finish::LostBy(actor) => (
                actor,
                ServerSignal::CallEnded {
                    session_id,
                    reason: EndReason::ConnectionLost,
                },
                SessionState::Failed,
            ),
        };
        if let Err(e) = session.transition(next) {
            warn!("Session {}: {}", session_id, e);
        }

        if let Some(partner) = session.partner_of(actor) {
            let grace_until = session
                .side_of(partner)
                .and_then(|side| session.offline_since(side))
                .map(|since| since + self.inner.settings.reconnect_grace);
            if let Err(notice) = self.deliver(partner, notice) {
                match grace_until {
                    Some(until) if until > now => {
                        debug!(
                            "Holding the end of session {} until {} reconnects",
                            session_id, partner
                        );
                        book.notices.insert(
                            partner,
                            HeldNotice {
                                signal: notice,
                                until,
                            },
                        );
                    }
                    _ => debug!("Partner {} of session {} is gone", partner, session_id),
                }
            }
        }

        for member in session.members() {
            let removed = !book.notices.contains_key(&member)
                && self
                    .inner
                    .peers
                    .remove_if(&member, |_, peer| peer.outbound.is_none())
                    .is_some();
            if !removed {
                self.set_state(member, ParticipantState::Idle);
            }
        }

        info!(
            "Session {} finished in state {} after {}s",
            session_id,
            session.state,
            session.duration(now).as_secs()
        );

        book.ended.insert(
            session_id,
            EndedSession {
                session_id,
                seeker_id: session.seeker_id,
                responder_id: session.responder_id,
                duration: session.duration(now),
                ended_at: now,
                reached_connected: session.started_at.is_some(),
                feedback_received: false,
            },
        );
    }

    /// Forgets the end notice held for `participant_id` once its grace window is over.
    fn drop_expired_notice(
        &self,
        book: &mut SessionBook,
        participant_id: ParticipantId,
        now: Instant,
    ) {
        let expired = book
            .notices
            .get(&participant_id)
            .is_some_and(|held| held.until <= now);
        if expired {
            book.notices.remove(&participant_id);
            self.inner
                .peers
                .remove_if(&participant_id, |_, peer| peer.outbound.is_none());
            debug!("Participant {} never came back for its end notice", participant_id);
        }
    }

    /// Delivers to `to`, or holds the signal while `to` is between connections.
    fn route_in_session(&self, session: &mut CallSession, to: ParticipantId, signal: ServerSignal) {
        let Some(side) = session.side_of(to) else {
            return;
        };
        if session.is_offline(side) {
            session.hold(side, signal);
            return;
        }
        if let Err(signal) = self.deliver(to, signal) {
            session.hold(side, signal);
        }
    }

    /// Sends one frame on the current binding of `to`. Gives the signal back on failure.
    fn deliver(&self, to: ParticipantId, signal: ServerSignal) -> Result<(), ServerSignal> {
        let Some(mut peer) = self.inner.peers.get_mut(&to) else {
            return Err(signal);
        };
        let Some(out) = peer.outbound.as_mut() else {
            return Err(signal);
        };

        let frame = Frame {
            seq: out.next_seq,
            signal,
        };
        match out.tx.send(frame) {
            Ok(()) => {
                out.next_seq += 1;
                Ok(())
            }
            Err(mpsc::error::SendError(frame)) => {
                peer.outbound = None;
                Err(frame.signal)
            }
        }
    }

    pub fn set_state(&self, participant_id: ParticipantId, state: ParticipantState) {
        if let Some(mut peer) = self.inner.peers.get_mut(&participant_id) {
            peer.state = state;
        }
    }

    pub fn state_of(&self, participant_id: ParticipantId) -> Option<ParticipantState> {
        self.inner.peers.get(&participant_id).map(|peer| peer.state)
    }

    /// Tells `to` that one of its signals was rejected.
    pub fn report_error(
        &self,
        to: ParticipantId,
        error: &UpliftError,
        session_id: Option<SessionId>,
    ) {
        let signal = ServerSignal::ServerError {
            code: error.code(),
            message: error.to_string(),
            session_id,
        };
        if self.deliver(to, signal).is_err() {
            debug!("Could not report error to {}", to);
        }
    }

    /// Currently bound participants, ordered by display name.
    pub fn roster(&self) -> Vec<RosterEntry> {
        let mut entries: Vec<RosterEntry> = self
            .inner
            .peers
            .iter()
            .filter(|peer| peer.outbound.is_some())
            .map(|peer| RosterEntry {
                id: *peer.key(),
                display_name: peer.profile.display_name.clone(),
                role: peer.profile.role,
                state: peer.state,
            })
            .collect();
        entries.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));
        entries
    }

    pub fn online_count(&self) -> usize {
        self.inner
            .peers
            .iter()
            .filter(|peer| peer.outbound.is_some())
            .count()
    }

    pub fn broadcast_roster(&self) {
        let participants = self.roster();
        for entry in &participants {
            let _ = self.deliver(
                entry.id,
                ServerSignal::Roster {
                    participants: participants.clone(),
                },
            );
        }
    }

    pub fn session_of(&self, participant_id: ParticipantId) -> Option<SessionId> {
        self.inner
            .sessions
            .lock()
            .by_participant
            .get(&participant_id)
            .copied()
    }

    pub fn session_state(&self, session_id: SessionId) -> Option<SessionState> {
        let book = self.inner.sessions.lock();
        match book.active.get(&session_id) {
            Some(session) => Some(session.state),
            None => book.ended.get(&session_id).map(|_| SessionState::Ended),
        }
    }

    pub fn is_authorized(&self, a: ParticipantId, b: ParticipantId) -> bool {
        self.inner.authorized.contains_key(&PairKey::new(a, b))
    }

    /// Drops expired match authorisations, unclaimed end notices and ended sessions past the
    /// feedback window.
    pub fn purge(&self) {
        let now = Instant::now();
        let match_ttl = self.inner.settings.match_ttl;
        let feedback_window = self.inner.settings.feedback_window;

        let mut expired = Vec::new();
        self.inner.authorized.retain(|key, at| {
            let live = now.duration_since(*at) <= match_ttl;
            if !live {
                expired.push(*key);
            }
            live
        });

        let mut book = self.inner.sessions.lock();
        for PairKey(a, b) in expired {
            for id in [a, b] {
                if !book.by_participant.contains_key(&id)
                    && self.state_of(id) == Some(ParticipantState::Negotiating)
                {
                    self.set_state(id, ParticipantState::Idle);
                }
            }
        }

        let waiting: Vec<ParticipantId> = book.notices.keys().copied().collect();
        for participant_id in waiting {
            self.drop_expired_notice(&mut book, participant_id, now);
        }

        let before = book.ended.len();
        book.ended
            .retain(|_, ended| now.duration_since(ended.ended_at) <= feedback_window);
        let purged = before - book.ended.len();
        if purged > 0 {
            debug!("Purged {} ended sessions", purged);
        }
    }

    /// Periodic roster broadcast and housekeeping until `token` is cancelled.
    pub async fn run_maintenance(self, token: CancellationToken) {
        let mut tick = tokio::time::interval(self.inner.settings.roster_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {
                    self.broadcast_roster();
                    self.purge();
                }
            }
        }
        info!("Relay maintenance stopped");
    }
}

impl MatchObserver for SignalingRelay {
    fn on_match(&self, record: MatchRecord) {
        self.inner
            .authorized
            .insert(PairKey::new(record.seeker, record.responder), Instant::now());
        self.set_state(record.seeker, ParticipantState::Negotiating);
        self.set_state(record.responder, ParticipantState::Negotiating);
    }
}
