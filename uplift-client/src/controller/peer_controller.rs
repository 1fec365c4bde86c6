use crate::controller::CandidateBuffer;
use crate::media::{LocalTrack, MediaKind};
use crate::signal_sender::SignalSender;
use crate::transport::{PeerTransport, SdpKind, SenderId, TransportEvent, TransportState};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uplift_core::{ClientSignal, ParticipantId, SessionId, UpliftError};

/// Negotiation state of one call.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PeerState {
    New,
    Offering,
    Answering,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What the controller reports to the session coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    Connected,
    /// Local media is attached and the transport carries it.
    LocalMediaFlowing,
    RemoteMediaAttached(MediaKind),
    Reconnecting,
    Recovered,
    Failed(UpliftError),
    Closed,
}

struct AttachedTrack {
    track: LocalTrack,
    sender: SenderId,
}

pub struct ControllerSettings {
    pub session_id: SessionId,
    pub partner_id: ParticipantId,
    /// The initiator sends the first offer and wins colliding offers.
    pub initiator: bool,
    pub max_ice_restarts: u32,
}

/// Owns the peer connection, the local tracks and the candidate buffers of one call.
///
/// Every method runs on the session's event loop, so buffers have a single writer.
pub struct PeerController {
    session_id: SessionId,
    partner_id: ParticipantId,
    initiator: bool,
    transport: Arc<dyn PeerTransport>,
    signals: Arc<dyn SignalSender>,
    state: PeerState,
    remote_description_set: bool,
    awaiting_answer: bool,
    /// The outstanding offer is an ICE restart.
    restarting: bool,
    renegotiation_pending: bool,
    restarts_left: u32,
    incoming: CandidateBuffer,
    outgoing: CandidateBuffer,
    tracks: Vec<AttachedTrack>,
    local_media_reported: bool,
    remote_media_reported: bool,
    events: VecDeque<ControllerEvent>,
}

fn negotiation_failed(e: anyhow::Error) -> UpliftError {
    UpliftError::NegotiationFailed(format!("{e:#}"))
}

impl PeerController {
    pub fn new(
        settings: ControllerSettings,
        transport: Arc<dyn PeerTransport>,
        signals: Arc<dyn SignalSender>,
    ) -> Self {
        Self {
            session_id: settings.session_id,
            partner_id: settings.partner_id,
            initiator: settings.initiator,
            transport,
            signals,
            state: PeerState::New,
            remote_description_set: false,
            awaiting_answer: false,
            restarting: false,
            renegotiation_pending: false,
            restarts_left: settings.max_ice_restarts,
            incoming: CandidateBuffer::new(),
            outgoing: CandidateBuffer::new(),
            tracks: Vec::new(),
            local_media_reported: false,
            remote_media_reported: false,
            events: VecDeque::new(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    /// Candidates still held back, as (received, generated).
    pub fn buffered_candidates(&self) -> (usize, usize) {
        (self.incoming.len(), self.outgoing.len())
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_renegotiation_pending(&self) -> bool {
        self.renegotiation_pending
    }

    pub fn drain_events(&mut self) -> Vec<ControllerEvent> {
        self.events.drain(..).collect()
    }

    fn ensure_open(&self, action: &'static str) -> Result<(), UpliftError> {
        match self.state {
            PeerState::Closed | PeerState::Failed => Err(UpliftError::InvalidTransition {
                action,
                state: self.state.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Hands a local track to the transport. Once negotiation has started the
    /// structural change is renegotiated.
    pub async fn attach_track(&mut self, track: LocalTrack) -> Result<(), UpliftError> {
        self.ensure_open("attachTrack")?;
        let sender = self
            .transport
            .add_track(&track)
            .await
            .map_err(negotiation_failed)?;
        debug!(
            "Session {}: attached {} track {}",
            self.session_id,
            track.kind(),
            track.id()
        );
        self.tracks.push(AttachedTrack { track, sender });

        if self.state != PeerState::New {
            self.request_renegotiation().await?;
        }
        self.report_local_media();
        Ok(())
    }

    /// Initiator side: create and send the first offer.
    pub async fn start_offer(&mut self) -> Result<(), UpliftError> {
        if self.state != PeerState::New || !self.initiator {
            return Err(UpliftError::InvalidTransition {
                action: "offer",
                state: self.state.to_string(),
            });
        }
        let sdp = self
            .transport
            .create_offer(false)
            .await
            .map_err(negotiation_failed)?;
        self.state = PeerState::Offering;
        self.awaiting_answer = true;

        self.signals
            .send(ClientSignal::OfferCall {
                to_participant_id: self.partner_id,
                session_id: self.session_id,
                sdp_offer: sdp,
            })
            .await?;
        info!("Session {}: offer sent to {}", self.session_id, self.partner_id);
        Ok(())
    }

    /// Answerer side: apply the incoming offer and send the answer.
    pub async fn accept_offer(&mut self, sdp_offer: String) -> Result<(), UpliftError> {
        if self.state != PeerState::New || self.initiator {
            return Err(UpliftError::InvalidTransition {
                action: "accept",
                state: self.state.to_string(),
            });
        }
        self.transport
            .set_remote_description(SdpKind::Offer, sdp_offer)
            .await
            .map_err(negotiation_failed)?;
        self.remote_description_set = true;
        self.flush_incoming().await;

        let sdp_answer = self
            .transport
            .create_answer()
            .await
            .map_err(negotiation_failed)?;
        self.state = PeerState::Answering;

        self.signals
            .send(ClientSignal::AcceptCall {
                session_id: self.session_id,
                sdp_answer,
            })
            .await?;
        self.flush_outgoing().await?;
        info!("Session {}: answer sent", self.session_id);
        Ok(())
    }

    pub async fn decline(&mut self) -> Result<(), UpliftError> {
        let sent = self
            .signals
            .send(ClientSignal::DeclineCall {
                session_id: self.session_id,
            })
            .await;
        self.close().await;
        sent
    }

    /// `callAccepted`: the answer to our first offer.
    pub async fn on_answer(&mut self, sdp_answer: String) -> Result<(), UpliftError> {
        if self.state != PeerState::Offering || !self.awaiting_answer {
            return Err(UpliftError::InvalidTransition {
                action: "answer",
                state: self.state.to_string(),
            });
        }
        self.transport
            .set_remote_description(SdpKind::Answer, sdp_answer)
            .await
            .map_err(negotiation_failed)?;
        self.remote_description_set = true;
        self.awaiting_answer = false;

        self.flush_incoming().await;
        self.flush_outgoing().await
    }

    pub async fn on_remote_candidate(&mut self, candidate: String) -> Result<(), UpliftError> {
        if self.state == PeerState::Closed {
            debug!(
                "Session {}: candidate after close discarded",
                self.session_id
            );
            return Ok(());
        }
        if !self.remote_description_set {
            self.incoming.push(candidate);
            return Ok(());
        }
        if let Err(e) = self.transport.add_ice_candidate(candidate).await {
            warn!("Session {}: remote candidate rejected: {:#}", self.session_id, e);
        }
        Ok(())
    }

    /// `renegotiate` from the partner: a track change or an ICE restart.
    pub async fn on_remote_offer(&mut self, sdp_offer: String) -> Result<(), UpliftError> {
        self.ensure_open("renegotiate")?;
        if !self.remote_description_set {
            return Err(UpliftError::InvalidTransition {
                action: "renegotiate",
                state: self.state.to_string(),
            });
        }

        if self.awaiting_answer {
            if self.initiator {
                debug!(
                    "Session {}: ignoring colliding offer, ours wins",
                    self.session_id
                );
                return Ok(());
            }
            self.transport.rollback().await.map_err(negotiation_failed)?;
            self.awaiting_answer = false;
            // A rolled-back restart is superseded by the partner's offer.
            if !std::mem::take(&mut self.restarting) {
                self.renegotiation_pending = true;
            }
        }

        self.transport
            .set_remote_description(SdpKind::Offer, sdp_offer)
            .await
            .map_err(negotiation_failed)?;
        let sdp_answer = self
            .transport
            .create_answer()
            .await
            .map_err(negotiation_failed)?;
        self.signals
            .send(ClientSignal::RenegotiateAnswer {
                session_id: self.session_id,
                sdp_answer,
            })
            .await?;
        self.maybe_renegotiate().await
    }

    /// `renegotiateAnswer` from the partner.
    pub async fn on_remote_answer(&mut self, sdp_answer: String) -> Result<(), UpliftError> {
        self.ensure_open("renegotiateAnswer")?;
        if !self.awaiting_answer {
            debug!("Session {}: stale renegotiation answer", self.session_id);
            return Ok(());
        }
        self.transport
            .set_remote_description(SdpKind::Answer, sdp_answer)
            .await
            .map_err(negotiation_failed)?;
        self.awaiting_answer = false;
        self.restarting = false;
        self.flush_outgoing().await?;
        self.maybe_renegotiate().await
    }

    pub async fn on_transport_event(&mut self, event: TransportEvent) -> Result<(), UpliftError> {
        match event {
            TransportEvent::CandidateGenerated(candidate) => {
                if self.state == PeerState::Closed {
                    return Ok(());
                }
                if !self.remote_description_set {
                    self.outgoing.push(candidate);
                    return Ok(());
                }
                self.signals
                    .send(ClientSignal::Candidate {
                        session_id: self.session_id,
                        candidate,
                    })
                    .await
            }
            TransportEvent::RemoteTrack { kind, track_id } => {
                debug!(
                    "Session {}: remote {} track {}",
                    self.session_id, kind, track_id
                );
                if !self.remote_media_reported {
                    self.remote_media_reported = true;
                    self.events
                        .push_back(ControllerEvent::RemoteMediaAttached(kind));
                }
                Ok(())
            }
            TransportEvent::StateChanged(state) => self.on_transport_state(state).await,
        }
    }

    async fn on_transport_state(&mut self, state: TransportState) -> Result<(), UpliftError> {
        if matches!(self.state, PeerState::Closed | PeerState::Failed) {
            return Ok(());
        }

        match state {
            TransportState::Connected => {
                let recovered = self.state == PeerState::Disconnected;
                if self.state == PeerState::Connected {
                    return Ok(());
                }
                self.state = PeerState::Connected;
                if recovered {
                    info!("Session {}: connection recovered", self.session_id);
                    self.events.push_back(ControllerEvent::Recovered);
                } else {
                    info!("Session {}: connected", self.session_id);
                    self.events.push_back(ControllerEvent::Connected);
                }
                self.report_local_media();
                self.maybe_renegotiate().await
            }
            TransportState::Disconnected | TransportState::Failed => {
                if self.state == PeerState::Disconnected {
                    return Ok(());
                }
                self.on_connection_lost(state).await
            }
            TransportState::Closed => {
                self.fail(UpliftError::NegotiationFailed(
                    "transport closed unexpectedly".to_string(),
                ));
                Ok(())
            }
            TransportState::New | TransportState::Connecting => Ok(()),
        }
    }

    async fn on_connection_lost(&mut self, observed: TransportState) -> Result<(), UpliftError> {
        if self.restarts_left == 0 || (self.awaiting_answer && self.state == PeerState::Offering) {
            self.fail(UpliftError::NegotiationFailed(format!(
                "transport {:?} with no reconnection attempt left",
                observed
            )));
            return Ok(());
        }

        self.restarts_left -= 1;
        self.state = PeerState::Disconnected;
        self.events.push_back(ControllerEvent::Reconnecting);
        warn!(
            "Session {}: transport {:?}, attempting to reconnect",
            self.session_id, observed
        );

        // Either side may restart. If both do, the initiator's offer wins.
        if let Err(e) = self.restart_ice().await {
            self.fail(e);
        }
        Ok(())
    }

    async fn restart_ice(&mut self) -> Result<(), UpliftError> {
        let sdp_offer = self
            .transport
            .create_offer(true)
            .await
            .map_err(negotiation_failed)?;
        self.awaiting_answer = true;
        self.restarting = true;
        self.signals
            .send(ClientSignal::Renegotiate {
                session_id: self.session_id,
                sdp_offer,
            })
            .await
    }

    /// Surfaces a terminal failure. The coordinator closes afterwards.
    pub fn fail(&mut self, error: UpliftError) {
        if matches!(self.state, PeerState::Closed | PeerState::Failed) {
            return;
        }
        warn!("Session {}: {}", self.session_id, error);
        self.state = PeerState::Failed;
        self.events.push_back(ControllerEvent::Failed(error));
    }

    /// Mute or unmute without renegotiating. Returns whether a track of `kind` exists.
    pub fn set_track_enabled(&mut self, kind: MediaKind, enabled: bool) -> bool {
        let mut found = false;
        for attached in self.tracks.iter().filter(|t| t.track.kind() == kind) {
            attached.track.set_enabled(enabled);
            found = true;
        }
        found
    }

    /// Swaps the track of the same kind, stopping the old one.
    pub async fn replace_track(&mut self, track: LocalTrack) -> Result<(), UpliftError> {
        self.ensure_open("replaceTrack")?;
        let Some(index) = self.tracks.iter().position(|t| t.track.kind() == track.kind()) else {
            return self.attach_track(track).await;
        };

        let sender = self.tracks[index].sender;
        self.transport
            .replace_track(sender, &track)
            .await
            .map_err(negotiation_failed)?;
        let old = std::mem::replace(&mut self.tracks[index], AttachedTrack { track, sender });
        old.track.stop();

        if self.state != PeerState::New {
            self.request_renegotiation().await?;
        }
        Ok(())
    }

    /// Detaches and stops the track of `kind`. Returns whether one was attached.
    pub async fn remove_track(&mut self, kind: MediaKind) -> Result<bool, UpliftError> {
        self.ensure_open("removeTrack")?;
        let Some(index) = self.tracks.iter().position(|t| t.track.kind() == kind) else {
            return Ok(false);
        };

        let attached = self.tracks.remove(index);
        let removed = self.transport.remove_track(attached.sender).await;
        attached.track.stop();
        removed.map_err(negotiation_failed)?;

        if self.state != PeerState::New {
            self.request_renegotiation().await?;
        }
        Ok(true)
    }

    async fn request_renegotiation(&mut self) -> Result<(), UpliftError> {
        self.renegotiation_pending = true;
        self.maybe_renegotiate().await
    }

    /// Renegotiates only while connected with no offer outstanding.
    async fn maybe_renegotiate(&mut self) -> Result<(), UpliftError> {
        if !self.renegotiation_pending
            || self.state != PeerState::Connected
            || self.awaiting_answer
        {
            return Ok(());
        }
        self.renegotiation_pending = false;

        let sdp_offer = self
            .transport
            .create_offer(false)
            .await
            .map_err(negotiation_failed)?;
        self.awaiting_answer = true;
        debug!("Session {}: renegotiating", self.session_id);
        self.signals
            .send(ClientSignal::Renegotiate {
                session_id: self.session_id,
                sdp_offer,
            })
            .await
    }

    async fn flush_incoming(&mut self) {
        let pending: Vec<String> = self.incoming.drain().collect();
        if !pending.is_empty() {
            debug!(
                "Session {}: applying {} buffered candidates",
                self.session_id,
                pending.len()
            );
        }
        for candidate in pending {
            if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                warn!("Session {}: buffered candidate rejected: {:#}", self.session_id, e);
            }
        }
    }

    async fn flush_outgoing(&mut self) -> Result<(), UpliftError> {
        let pending: Vec<String> = self.outgoing.drain().collect();
        for candidate in pending {
            self.signals
                .send(ClientSignal::Candidate {
                    session_id: self.session_id,
                    candidate,
                })
                .await?;
        }
        Ok(())
    }

    fn report_local_media(&mut self) {
        if !self.local_media_reported
            && self.state == PeerState::Connected
            && !self.tracks.is_empty()
        {
            self.local_media_reported = true;
            self.events.push_back(ControllerEvent::LocalMediaFlowing);
        }
    }

    /// Stops every track and closes the transport. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.state == PeerState::Closed {
            return;
        }
        for attached in self.tracks.drain(..) {
            attached.track.stop();
        }

        let (incoming, outgoing) = self.buffered_candidates();
        if incoming + outgoing > 0 {
            debug!(
                "Session {}: discarding {} received and {} generated candidates on close",
                self.session_id, incoming, outgoing
            );
        }
        self.incoming = CandidateBuffer::new();
        self.outgoing = CandidateBuffer::new();

        if let Err(e) = self.transport.close().await {
            warn!("Session {}: transport close failed: {:#}", self.session_id, e);
        }
        self.state = PeerState::Closed;
        self.events.push_back(ControllerEvent::Closed);
        info!("Session {}: peer connection closed", self.session_id);
    }
}
