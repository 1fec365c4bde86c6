use crate::config::ClientConfig;
use crate::controller::{ControllerSettings, PeerController};
use crate::media::{LocalTrack, MediaDevices, MediaKind};
use crate::queue_client::QueueClient;
use crate::registry::Subscription;
use crate::relay_link::{RelayLink, RelayProfile};
use crate::session::{
    SessionChannels, SessionCommand, SessionCoordinator, SessionEvent, SessionOutcome,
    SessionSetup, SessionStart,
};
use crate::signal_sender::SignalSender;
use crate::transport::{PeerTransport, WebRtcTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uplift_core::{
    EnqueueRequest, Feedback, MatchInfo, ParticipantId, Role, ServerSignal, SessionId, UpliftError,
};

const TRANSPORT_EVENT_CAPACITY: usize = 64;

/// Control surface of a running call.
///
/// Dropping the handle hangs up.
pub struct CallHandle {
    session_id: SessionId,
    partner: MatchInfo,
    commands: mpsc::Sender<SessionCommand>,
    events_tx: broadcast::Sender<SessionEvent>,
    events: broadcast::Receiver<SessionEvent>,
    task: JoinHandle<SessionOutcome>,
    request_timeout: Duration,
}

impl CallHandle {
    /// Spawns the coordinator's event loop.
    pub fn spawn(
        coordinator: SessionCoordinator,
        channels: SessionChannels,
        session_id: SessionId,
        partner: MatchInfo,
        request_timeout: Duration,
    ) -> Self {
        let events = channels.events.subscribe();
        let task = tokio::spawn(coordinator.run());
        Self {
            session_id,
            partner,
            commands: channels.commands,
            events_tx: channels.events,
            events,
            task,
            request_timeout,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn partner(&self) -> &MatchInfo {
        &self.partner
    }

    /// Next event of this call; `None` once the call is closed.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Session {}: skipped {} events", self.session_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Another listener, starting from the next event.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Ends the call. Hanging up a finished call is a no-op.
    pub async fn hang_up(&self) -> Result<(), UpliftError> {
        match self
            .commands
            .send_timeout(SessionCommand::HangUp, self.request_timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Closed(_)) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                Err(UpliftError::Timeout("session command"))
            }
        }
    }

    /// Mutes or unmutes without renegotiating.
    pub async fn set_track_enabled(
        &self,
        kind: MediaKind,
        enabled: bool,
    ) -> Result<bool, UpliftError> {
        self.request(|reply| SessionCommand::SetTrackEnabled {
            kind,
            enabled,
            reply,
        })
        .await
    }

    pub async fn replace_track(&self, track: LocalTrack) -> Result<(), UpliftError> {
        self.request(|reply| SessionCommand::ReplaceTrack { track, reply })
            .await?
    }

    pub async fn remove_track(&self, kind: MediaKind) -> Result<bool, UpliftError> {
        self.request(|reply| SessionCommand::RemoveTrack { kind, reply })
            .await?
    }

    /// Accepted once the call has ended, from the seeker of a call that ran.
    pub async fn submit_feedback(&self, feedback: Feedback) -> Result<(), UpliftError> {
        self.request(|reply| SessionCommand::SubmitFeedback { feedback, reply })
            .await?
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits until the call is fully closed, feedback included.
    pub async fn outcome(self) -> Result<SessionOutcome, UpliftError> {
        let CallHandle { task, commands, .. } = self;
        let outcome = task
            .await
            .map_err(|e| UpliftError::Transport(format!("session task failed: {e}")));
        drop(commands);
        outcome
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, UpliftError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send_timeout(make(reply_tx), self.request_timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => {
                    UpliftError::Timeout("session command")
                }
                mpsc::error::SendTimeoutError::Closed(_) => UpliftError::ChannelClosed,
            })?;

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(UpliftError::ChannelClosed),
            Err(_) => Err(UpliftError::Timeout("session reply")),
        }
    }
}

/// Finds a partner and sets up calls for one participant.
pub struct CallClient {
    config: ClientConfig,
    participant_id: ParticipantId,
    profile: RelayProfile,
    queue: QueueClient,
    devices: Arc<dyn MediaDevices>,
}

impl CallClient {
    pub fn new(config: ClientConfig, profile: RelayProfile, devices: Arc<dyn MediaDevices>) -> Self {
        Self::with_participant_id(config, ParticipantId::new(), profile, devices)
    }

    pub fn with_participant_id(
        config: ClientConfig,
        participant_id: ParticipantId,
        profile: RelayProfile,
        devices: Arc<dyn MediaDevices>,
    ) -> Self {
        let queue = QueueClient::new(config.server_url.clone(), config.request_timeout());
        Self {
            config,
            participant_id,
            profile,
            queue,
            devices,
        }
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    pub fn role(&self) -> Role {
        self.profile.role
    }

    pub fn queue(&self) -> &QueueClient {
        &self.queue
    }

    /// Opens the relay connection. One link serves any number of consecutive calls.
    pub async fn connect(&self) -> anyhow::Result<Arc<RelayLink>> {
        let url = self.config.relay_url(self.participant_id)?;
        RelayLink::connect(
            &url,
            self.participant_id,
            self.profile.clone(),
            self.config.link_settings(),
        )
        .await
    }

    /// Queues, waits for a partner and starts the call.
    ///
    /// Returns `None` when `token` is cancelled first.
    pub async fn find_call(
        &self,
        link: &Arc<RelayLink>,
        token: &CancellationToken,
    ) -> Result<Option<CallHandle>, UpliftError> {
        let request = EnqueueRequest {
            participant_id: self.participant_id,
            role: self.profile.role,
            display_name: self.profile.display_name.clone(),
            priority_score: self.profile.rating_hint.unwrap_or_default(),
        };
        let Some(partner) = self
            .queue
            .wait_for_match(
                &request,
                self.config.poll_interval(),
                self.config.match_timeout(),
                token,
            )
            .await?
        else {
            return Ok(None);
        };

        let (session_id, start) = match self.profile.role {
            Role::Seeker => (SessionId::new(), SessionStart::Offer),
            Role::Responder => {
                let Some((session_id, sdp_offer)) =
                    self.await_incoming_call(link, partner.partner_id, token).await?
                else {
                    return Ok(None);
                };
                (session_id, SessionStart::Answer { sdp_offer })
            }
        };

        let subscription = link.subscribe(session_id);
        let signals: Arc<dyn SignalSender> = link.clone();
        self.start_call(link, signals, subscription, session_id, partner, start)
            .await
            .map(Some)
    }

    async fn await_incoming_call(
        &self,
        link: &RelayLink,
        partner_id: ParticipantId,
        token: &CancellationToken,
    ) -> Result<Option<(SessionId, String)>, UpliftError> {
        let deadline = Instant::now() + self.config.incoming_call_timeout();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(UpliftError::Timeout("incoming call"));
            }
            let signal = tokio::select! {
                _ = token.cancelled() => return Ok(None),
                signal = link.next_lobby(remaining) => signal?,
            };

            match signal {
                ServerSignal::IncomingCall {
                    from_participant_id,
                    session_id,
                    sdp_offer,
                } if from_participant_id == partner_id => {
                    info!("Incoming call {} from {}", session_id, partner_id);
                    return Ok(Some((session_id, sdp_offer)));
                }
                ServerSignal::IncomingCall {
                    from_participant_id,
                    ..
                } => {
                    warn!(
                        "Ignoring call from {}, waiting for {}",
                        from_participant_id, partner_id
                    );
                }
                ServerSignal::ServerError { code, message, .. } => {
                    warn!("Relay error while waiting for a call ({:?}): {}", code, message);
                }
                other => debug!("Lobby: {:?}", other),
            }
        }
    }

    async fn start_call(
        &self,
        link: &RelayLink,
        signals: Arc<dyn SignalSender>,
        subscription: Subscription,
        session_id: SessionId,
        partner: MatchInfo,
        start: SessionStart,
    ) -> Result<CallHandle, UpliftError> {
        let role = self.profile.role;
        let mut ice_servers = link.ice_servers();
        if ice_servers.is_empty() {
            ice_servers = self.config.ice_servers.clone();
        }

        let (transport_tx, transport_rx) = mpsc::channel(TRANSPORT_EVENT_CAPACITY);
        let transport: Arc<dyn PeerTransport> = Arc::new(
            WebRtcTransport::new(session_id, &ice_servers, transport_tx)
                .await
                .map_err(|e| UpliftError::NegotiationFailed(format!("{e:#}")))?,
        );

        let mut controller = PeerController::new(
            ControllerSettings {
                session_id,
                partner_id: partner.partner_id,
                initiator: role == Role::Seeker,
                max_ice_restarts: self.config.max_ice_restarts,
            },
            transport,
            Arc::clone(&signals),
        );

        if let Err(e) = self.open_media(&mut controller).await {
            warn!("Session {}: media unavailable: {}", session_id, e);
            if role == Role::Responder {
                let _ = controller.decline().await;
            } else {
                controller.close().await;
            }
            return Err(e);
        }

        let setup = SessionSetup {
            session_id,
            role,
            partner_id: partner.partner_id,
            start,
            session_limit: self.config.session_limit(),
            negotiation_timeout: self.config.negotiation_timeout(),
            feedback_timeout: self.config.feedback_timeout(),
        };
        let (coordinator, channels) =
            SessionCoordinator::new(setup, controller, signals, subscription, transport_rx);

        Ok(CallHandle::spawn(
            coordinator,
            channels,
            session_id,
            partner,
            self.config.request_timeout(),
        ))
    }

    async fn open_media(&self, controller: &mut PeerController) -> Result<(), UpliftError> {
        let audio = self.devices.open(MediaKind::Audio).await?;
        controller.attach_track(audio).await?;
        if self.config.video {
            let video = self.devices.open(MediaKind::Video).await?;
            controller.attach_track(video).await?;
        }
        Ok(())
    }
}
