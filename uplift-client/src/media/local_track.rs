use anyhow::Result;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    fn capability(self) -> RTCRtpCodecCapability {
        match self {
            MediaKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            MediaKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

struct TrackState {
    enabled: AtomicBool,
    stop: CancellationToken,
}

/// A local media device handle.
///
/// Exactly one owner holds it; the capture side writes through a [`TrackWriter`].
/// The handle is stopped explicitly with [`LocalTrack::stop`] or when dropped.
pub struct LocalTrack {
    id: String,
    kind: MediaKind,
    rtp: Arc<TrackLocalStaticSample>,
    state: Arc<TrackState>,
}

impl LocalTrack {
    pub fn new(kind: MediaKind, stream_id: &str) -> Self {
        let id = format!("{kind}-{}", Uuid::new_v4());
        let rtp = Arc::new(TrackLocalStaticSample::new(
            kind.capability(),
            id.clone(),
            stream_id.to_string(),
        ));
        Self {
            id,
            kind,
            rtp,
            state: Arc::new(TrackState {
                enabled: AtomicBool::new(true),
                stop: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// The RTP side handed to the peer connection.
    pub fn rtp_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        Arc::clone(&self.rtp) as Arc<dyn TrackLocal + Send + Sync>
    }

    pub fn writer(&self) -> TrackWriter {
        TrackWriter {
            rtp: Arc::clone(&self.rtp),
            state: Arc::clone(&self.state),
        }
    }

    /// Muting keeps the track attached and drops frames.
    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        if !self.state.stop.is_cancelled() {
            debug!("Stopping {} track {}", self.kind, self.id);
            self.state.stop.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stop.is_cancelled()
    }
}

impl Drop for LocalTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Capture-side handle of a [`LocalTrack`].
#[derive(Clone)]
pub struct TrackWriter {
    rtp: Arc<TrackLocalStaticSample>,
    state: Arc<TrackState>,
}

impl TrackWriter {
    /// Writes one encoded frame. Returns `false` when the frame was dropped
    /// because the track is muted or stopped.
    pub async fn write_frame(&self, data: Bytes, duration: Duration) -> Result<bool> {
        if self.state.stop.is_cancelled() || !self.state.enabled.load(Ordering::Relaxed) {
            return Ok(false);
        }
        self.rtp
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(true)
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stop.is_cancelled()
    }

    /// Resolves once the owning track is stopped.
    pub fn stopped(&self) -> WaitForCancellationFutureOwned {
        self.state.stop.clone().cancelled_owned()
    }
}
