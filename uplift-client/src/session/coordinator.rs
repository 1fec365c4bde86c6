use crate::controller::{ControllerEvent, PeerController};
use crate::media::{LocalTrack, MediaKind};
use crate::registry::Subscription;
use crate::session::SessionTimer;
use crate::signal_sender::SignalSender;
use crate::transport::TransportEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};
use uplift_core::{
    ClientSignal, EndReason, ErrorCode, Feedback, ParticipantId, Role, ServerSignal, SessionId,
    UpliftError,
};

const COMMAND_CAPACITY: usize = 16;
const EVENT_CAPACITY: usize = 64;

/// How the call opens on this side.
#[derive(Debug, Clone)]
pub enum SessionStart {
    /// Send the first offer.
    Offer,
    /// Answer the offer received in `incomingCall`.
    Answer { sdp_offer: String },
}

#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub session_id: SessionId,
    pub role: Role,
    pub partner_id: ParticipantId,
    pub start: SessionStart,
    pub session_limit: Duration,
    /// Bound on the initial negotiation and on each reconnection.
    pub negotiation_timeout: Duration,
    /// How long a closed session waits for the seeker's feedback.
    pub feedback_timeout: Duration,
}

pub enum SessionCommand {
    HangUp,
    SetTrackEnabled {
        kind: MediaKind,
        enabled: bool,
        reply: oneshot::Sender<bool>,
    },
    ReplaceTrack {
        track: LocalTrack,
        reply: oneshot::Sender<Result<(), UpliftError>>,
    },
    RemoveTrack {
        kind: MediaKind,
        reply: oneshot::Sender<Result<bool, UpliftError>>,
    },
    SubmitFeedback {
        feedback: Feedback,
        reply: oneshot::Sender<Result<(), UpliftError>>,
    },
}

/// Progress of a call, broadcast to every listener.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    /// Media flows both ways and the clock runs.
    Running { limit: Duration },
    Reconnecting,
    Recovered,
    PeerReconnecting,
    PeerReconnected,
    Ended {
        reason: EndReason,
        duration: Duration,
    },
    FeedbackRequired,
    Closed,
}

/// Final report of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub reason: EndReason,
    /// Running time, zero when media never flowed both ways.
    pub duration: Duration,
    pub started: bool,
    /// The seeker's feedback. Only asked for when the call reached `Running`; a call that
    /// never carried media both ways closes without it, and the relay would reject it.
    pub feedback: Option<Feedback>,
    /// Set when the call ended on a failure.
    pub error: Option<UpliftError>,
}

/// Sending halves kept by the call handle.
pub struct SessionChannels {
    pub commands: mpsc::Sender<SessionCommand>,
    pub events: broadcast::Sender<SessionEvent>,
}

enum Step {
    Command(Option<SessionCommand>),
    Signal(Option<ServerSignal>),
    Transport(TransportEvent),
    Expired,
    NegotiationTimeout,
}

/// Drives one call from the first offer to the final feedback.
///
/// Every way a call can end (hangup, remote end, expiry, failure, a dropped
/// handle, a lost relay) goes through [`SessionCoordinator::end`].
pub struct SessionCoordinator {
    setup: SessionSetup,
    controller: PeerController,
    signals: Arc<dyn SignalSender>,
    subscription: Option<Subscription>,
    transport_events: mpsc::Receiver<TransportEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    timer: SessionTimer,
    negotiation_deadline: Option<Instant>,
    ended: Option<EndReason>,
    error: Option<UpliftError>,
}

impl SessionCoordinator {
    pub fn new(
        setup: SessionSetup,
        controller: PeerController,
        signals: Arc<dyn SignalSender>,
        subscription: Subscription,
        transport_events: mpsc::Receiver<TransportEvent>,
    ) -> (Self, SessionChannels) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let timer = SessionTimer::new(setup.session_limit);

        let coordinator = Self {
            setup,
            controller,
            signals,
            subscription: Some(subscription),
            transport_events,
            commands: command_rx,
            events: event_tx.clone(),
            timer,
            negotiation_deadline: None,
            ended: None,
            error: None,
        };
        let channels = SessionChannels {
            commands: command_tx,
            events: event_tx,
        };
        (coordinator, channels)
    }

    pub async fn run(mut self) -> SessionOutcome {
        let session_id = self.setup.session_id;
        info!("Session {} starting as {}", session_id, self.setup.role);
        self.negotiation_deadline = Some(Instant::now() + self.setup.negotiation_timeout);

        let started = match self.setup.start.clone() {
            SessionStart::Offer => self.controller.start_offer().await,
            SessionStart::Answer { sdp_offer } => self.controller.accept_offer(sdp_offer).await,
        };
        if let Err(e) = started {
            self.controller.fail(e);
        }
        self.process_controller_events().await;

        while self.ended.is_none() {
            let step = self.next_step().await;
            match step {
                Step::Command(Some(command)) => self.on_command(command).await,
                Step::Command(None) => {
                    info!("Session {}: handle dropped, hanging up", session_id);
                    self.end(EndReason::Hangup).await;
                }
                Step::Signal(Some(signal)) => self.on_signal(signal).await,
                Step::Signal(None) => {
                    warn!("Session {}: relay link could not be re-established", session_id);
                    self.error = Some(UpliftError::ChannelClosed);
                    self.end(EndReason::ConnectionLost).await;
                }
                Step::Transport(event) => {
                    let result = self.controller.on_transport_event(event).await;
                    self.check(result);
                }
                Step::Expired => {
                    info!("Session {}: time limit reached", session_id);
                    self.end(EndReason::Expired).await;
                }
                Step::NegotiationTimeout => {
                    self.controller.fail(UpliftError::NegotiationFailed(
                        "timed out waiting for the connection".to_string(),
                    ));
                }
            }
            self.process_controller_events().await;
        }

        let feedback = self.collect_feedback().await;
        self.emit(SessionEvent::Closed);

        let reason = self.ended.unwrap_or(EndReason::Hangup);
        let outcome = SessionOutcome {
            session_id,
            reason,
            duration: self.timer.elapsed(Instant::now()),
            started: self.timer.has_started(),
            feedback,
            error: self.error.take(),
        };
        info!(
            "Session {} closed: {} after {}s",
            session_id,
            outcome.reason,
            outcome.duration.as_secs()
        );
        outcome
    }

    async fn next_step(&mut self) -> Step {
        let timer_deadline = self.timer.deadline();
        let negotiation_deadline = self.negotiation_deadline;
        let listening = self.subscription.is_some();

        tokio::select! {
            biased;

            command = self.commands.recv() => Step::Command(command),

            signal = next_signal(&mut self.subscription), if listening => Step::Signal(signal),

            Some(event) = self.transport_events.recv() => Step::Transport(event),

            _ = sleep_until(timer_deadline.unwrap_or_else(Instant::now)), if timer_deadline.is_some() => {
                Step::Expired
            }

            _ = sleep_until(negotiation_deadline.unwrap_or_else(Instant::now)), if negotiation_deadline.is_some() => {
                Step::NegotiationTimeout
            }
        }
    }

    async fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::HangUp => self.end(EndReason::Hangup).await,
            SessionCommand::SetTrackEnabled {
                kind,
                enabled,
                reply,
            } => {
                let _ = reply.send(self.controller.set_track_enabled(kind, enabled));
            }
            SessionCommand::ReplaceTrack { track, reply } => {
                let result = self.controller.replace_track(track).await;
                self.check(result.clone());
                let _ = reply.send(result);
            }
            SessionCommand::RemoveTrack { kind, reply } => {
                let result = self.controller.remove_track(kind).await;
                self.check(result.clone().map(|_| ()));
                let _ = reply.send(result);
            }
            SessionCommand::SubmitFeedback { reply, .. } => {
                let _ = reply.send(Err(UpliftError::InvalidTransition {
                    action: "feedback",
                    state: "inCall".to_string(),
                }));
            }
        }
    }

    async fn on_signal(&mut self, signal: ServerSignal) {
        let session_id = self.setup.session_id;
        let result = match signal {
            ServerSignal::CallAccepted { sdp_answer, .. } => {
                self.controller.on_answer(sdp_answer).await
            }
            ServerSignal::Candidate { candidate, .. } => {
                self.controller.on_remote_candidate(candidate).await
            }
            ServerSignal::Renegotiate { sdp_offer, .. } => {
                self.controller.on_remote_offer(sdp_offer).await
            }
            ServerSignal::RenegotiateAnswer { sdp_answer, .. } => {
                self.controller.on_remote_answer(sdp_answer).await
            }
            ServerSignal::CallDeclined { .. } => {
                info!("Session {}: declined by the partner", session_id);
                self.end(EndReason::Declined).await;
                Ok(())
            }
            ServerSignal::CallEnded { reason, .. } => {
                let reason = match reason {
                    EndReason::ConnectionLost => EndReason::ConnectionLost,
                    _ => EndReason::RemoteEnded,
                };
                info!("Session {}: ended by the relay ({})", session_id, reason);
                self.end(reason).await;
                Ok(())
            }
            ServerSignal::PeerReconnecting { .. } => {
                self.emit(SessionEvent::PeerReconnecting);
                Ok(())
            }
            ServerSignal::PeerReconnected { .. } => {
                self.emit(SessionEvent::PeerReconnected);
                Ok(())
            }
            ServerSignal::ServerError { code, message, .. } => {
                warn!("Session {}: relay error {:?}: {}", session_id, code, message);
                if is_setup_failure(code) && !self.timer.has_started() {
                    Err(UpliftError::NegotiationFailed(message))
                } else {
                    Ok(())
                }
            }
            other => {
                debug!("Session {}: ignoring {:?}", session_id, other);
                Ok(())
            }
        };
        self.check(result);
    }

    /// Terminal errors fail the call; the rest are only logged.
    fn check(&mut self, result: Result<(), UpliftError>) {
        match result {
            Ok(()) => {}
            Err(
                e @ (UpliftError::NegotiationFailed(_)
                | UpliftError::ChannelClosed
                | UpliftError::Timeout(_)),
            ) => self.controller.fail(e),
            Err(e) => warn!("Session {}: {}", self.setup.session_id, e),
        }
    }

    async fn process_controller_events(&mut self) {
        for event in self.controller.drain_events() {
            let now = Instant::now();
            match event {
                ControllerEvent::Connected => {
                    self.negotiation_deadline = None;
                    self.emit(SessionEvent::Connected);
                }
                ControllerEvent::LocalMediaFlowing => {
                    if self.timer.local_media_attached(now) {
                        self.on_running();
                    }
                }
                ControllerEvent::RemoteMediaAttached(kind) => {
                    debug!("Session {}: remote {} attached", self.setup.session_id, kind);
                    if self.timer.remote_media_attached(now) {
                        self.on_running();
                    }
                }
                ControllerEvent::Reconnecting => {
                    self.negotiation_deadline = Some(now + self.setup.negotiation_timeout);
                    self.emit(SessionEvent::Reconnecting);
                }
                ControllerEvent::Recovered => {
                    self.negotiation_deadline = None;
                    self.emit(SessionEvent::Recovered);
                }
                ControllerEvent::Failed(error) => {
                    self.error = Some(error);
                    self.end(EndReason::Failed).await;
                }
                ControllerEvent::Closed => {}
            }
        }
    }

    fn on_running(&mut self) {
        info!(
            "Session {}: media flowing both ways, {}s on the clock",
            self.setup.session_id,
            self.setup.session_limit.as_secs()
        );
        self.emit(SessionEvent::Running {
            limit: self.setup.session_limit,
        });
    }

    /// The one teardown path. Later calls are no-ops.
    async fn end(&mut self, reason: EndReason) {
        if self.ended.is_some() {
            return;
        }
        self.ended = Some(reason);
        let now = Instant::now();
        self.timer.stop(now);
        self.negotiation_deadline = None;

        if reason.is_local() {
            let end_call = ClientSignal::EndCall {
                session_id: self.setup.session_id,
            };
            if let Err(e) = self.signals.send(end_call).await {
                warn!(
                    "Session {}: could not notify the partner: {}",
                    self.setup.session_id, e
                );
            }
        }

        self.controller.close().await;
        self.subscription = None;

        self.emit(SessionEvent::Ended {
            reason,
            duration: self.timer.elapsed(now),
        });
    }

    /// Seekers owe feedback for calls that actually ran.
    async fn collect_feedback(&mut self) -> Option<Feedback> {
        if self.setup.role != Role::Seeker || !self.timer.has_started() {
            return None;
        }
        self.emit(SessionEvent::FeedbackRequired);

        let deadline = Instant::now() + self.setup.feedback_timeout;
        loop {
            let command = tokio::select! {
                command = self.commands.recv() => command,
                _ = sleep_until(deadline) => {
                    warn!("Session {}: no feedback before the deadline", self.setup.session_id);
                    return None;
                }
            };

            match command {
                Some(SessionCommand::SubmitFeedback { feedback, reply }) => {
                    let result = self.send_feedback(&feedback).await;
                    let accepted = result.is_ok();
                    let _ = reply.send(result);
                    if accepted {
                        return Some(feedback);
                    }
                }
                Some(SessionCommand::SetTrackEnabled { reply, .. }) => {
                    let _ = reply.send(false);
                }
                Some(SessionCommand::ReplaceTrack { reply, .. }) => {
                    let _ = reply.send(Err(self.ended_error("replaceTrack")));
                }
                Some(SessionCommand::RemoveTrack { reply, .. }) => {
                    let _ = reply.send(Err(self.ended_error("removeTrack")));
                }
                Some(SessionCommand::HangUp) => {}
                None => {
                    warn!(
                        "Session {}: handle dropped before feedback",
                        self.setup.session_id
                    );
                    return None;
                }
            }
        }
    }

    async fn send_feedback(&self, feedback: &Feedback) -> Result<(), UpliftError> {
        feedback.validate()?;
        self.signals
            .send(ClientSignal::Feedback {
                session_id: self.setup.session_id,
                feedback: feedback.clone(),
            })
            .await
    }

    fn ended_error(&self, action: &'static str) -> UpliftError {
        UpliftError::InvalidTransition {
            action,
            state: "ended".to_string(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

async fn next_signal(subscription: &mut Option<Subscription>) -> Option<ServerSignal> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

/// Relay errors that mean the call cannot be set up.
fn is_setup_failure(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::PeerUnreachable
            | ErrorCode::NotMatched
            | ErrorCode::UnknownSession
            | ErrorCode::NotInSession
            | ErrorCode::InvalidTransition
    )
}
