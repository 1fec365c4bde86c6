use crate::media::{LocalTrack, MediaKind};
use anyhow::Result;
use async_trait::async_trait;

/// Handle of a sender created by [`PeerTransport::add_track`].
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct SenderId(pub u32);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Coarse connection state reported by the transport.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Events the transport pushes to the controller's event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A local ICE candidate, serialised as `RTCIceCandidateInit` JSON.
    CandidateGenerated(String),
    StateChanged(TransportState),
    /// The first packets of a remote track arrived.
    RemoteTrack { kind: MediaKind, track_id: String },
}

/// The media stack seen by the peer controller.
///
/// Offer and answer methods also apply the created description locally.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self, ice_restart: bool) -> Result<String>;

    async fn create_answer(&self) -> Result<String>;

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()>;

    /// Drops a local offer that lost a renegotiation glare.
    async fn rollback(&self) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: String) -> Result<()>;

    async fn add_track(&self, track: &LocalTrack) -> Result<SenderId>;

    async fn replace_track(&self, sender: SenderId, track: &LocalTrack) -> Result<()>;

    async fn remove_track(&self, sender: SenderId) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
