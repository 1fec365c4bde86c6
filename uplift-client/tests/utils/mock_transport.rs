use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use uplift_client::{LocalTrack, MediaKind, PeerTransport, SdpKind, SenderId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    CreateOffer { ice_restart: bool },
    CreateAnswer,
    SetRemote(SdpKind, String),
    Rollback,
    AddCandidate(String),
    AddTrack(MediaKind),
    ReplaceTrack(SenderId, MediaKind),
    RemoveTrack(SenderId),
    Close,
}

/// Records every call; SDP bodies are numbered so tests can tell offers apart.
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    next_sender: AtomicU32,
    sdp_counter: AtomicU32,
    pub fail_remote_description: AtomicBool,
    pub fail_candidates: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::AddCandidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn offers(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::CreateOffer { ice_restart } => Some(ice_restart),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &TransportCall) -> usize {
        self.calls().iter().filter(|c| *c == wanted).count()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }

    fn sdp(&self, kind: &str) -> String {
        let n = self.sdp_counter.fetch_add(1, Ordering::SeqCst);
        format!("{kind}-{n}")
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&self, ice_restart: bool) -> Result<String> {
        self.record(TransportCall::CreateOffer { ice_restart });
        Ok(self.sdp("offer"))
    }

    async fn create_answer(&self) -> Result<String> {
        self.record(TransportCall::CreateAnswer);
        Ok(self.sdp("answer"))
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        if self.fail_remote_description.load(Ordering::SeqCst) {
            bail!("malformed sdp");
        }
        self.record(TransportCall::SetRemote(kind, sdp));
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.record(TransportCall::Rollback);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: String) -> Result<()> {
        self.record(TransportCall::AddCandidate(candidate));
        if self.fail_candidates.load(Ordering::SeqCst) {
            bail!("candidate rejected");
        }
        Ok(())
    }

    async fn add_track(&self, track: &LocalTrack) -> Result<SenderId> {
        self.record(TransportCall::AddTrack(track.kind()));
        Ok(SenderId(self.next_sender.fetch_add(1, Ordering::SeqCst)))
    }

    async fn replace_track(&self, sender: SenderId, track: &LocalTrack) -> Result<()> {
        self.record(TransportCall::ReplaceTrack(sender, track.kind()));
        Ok(())
    }

    async fn remove_track(&self, sender: SenderId) -> Result<()> {
        self.record(TransportCall::RemoveTrack(sender));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(TransportCall::Close);
        Ok(())
    }
}
