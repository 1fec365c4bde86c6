use crate::media::{LocalTrack, MediaKind, TrackWriter};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, warn};
use uplift_core::UpliftError;

/// Opens local capture devices. Refusal is reported as `MediaAccessDenied`.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open(&self, kind: MediaKind) -> Result<LocalTrack, UpliftError>;
}

/// Synthetic devices for headless participants: silence on audio, a blank frame on video.
#[derive(Debug, Clone)]
pub struct SampleDevices {
    stream_id: String,
    allow_audio: bool,
    allow_video: bool,
}

/// Opus TOC byte for a 20 ms silent frame.
const OPUS_SILENCE: &[u8] = &[0xf8, 0xff, 0xfe];
const AUDIO_FRAME: Duration = Duration::from_millis(20);
/// Fixed key frame sent as the blank picture.
const VP8_BLANK: &[u8] = &[
    0x50, 0x01, 0x00, 0x9d, 0x01, 0x2a, 0x10, 0x00, 0x10, 0x00, 0x00, 0x47, 0x08, 0x85, 0x85,
    0x88, 0x85, 0x84, 0x88, 0x02, 0x02, 0x00,
];
const VIDEO_FRAME: Duration = Duration::from_millis(100);

impl SampleDevices {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            allow_audio: true,
            allow_video: true,
        }
    }

    /// Devices whose permission prompt was refused.
    pub fn denied(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            allow_audio: false,
            allow_video: false,
        }
    }

    pub fn without_video(mut self) -> Self {
        self.allow_video = false;
        self
    }
}

#[async_trait]
impl MediaDevices for SampleDevices {
    async fn open(&self, kind: MediaKind) -> Result<LocalTrack, UpliftError> {
        let allowed = match kind {
            MediaKind::Audio => self.allow_audio,
            MediaKind::Video => self.allow_video,
        };
        if !allowed {
            return Err(UpliftError::MediaAccessDenied(format!(
                "{kind} capture is not permitted"
            )));
        }

        let track = LocalTrack::new(kind, &self.stream_id);
        let (payload, interval) = match kind {
            MediaKind::Audio => (Bytes::from_static(OPUS_SILENCE), AUDIO_FRAME),
            MediaKind::Video => (Bytes::from_static(VP8_BLANK), VIDEO_FRAME),
        };
        tokio::spawn(feed(track.writer(), payload, interval));
        debug!("Opened sample {} track {}", kind, track.id());
        Ok(track)
    }
}

async fn feed(writer: TrackWriter, payload: Bytes, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let stopped = writer.stopped();
    tokio::pin!(stopped);

    loop {
        tokio::select! {
            _ = &mut stopped => break,
            _ = ticker.tick() => {
                if let Err(e) = writer.write_frame(payload.clone(), interval).await {
                    warn!("Sample feed stopped: {}", e);
                    break;
                }
            }
        }
    }
}
