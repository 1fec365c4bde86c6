mod devices;
mod local_track;

pub use devices::{MediaDevices, SampleDevices};
pub use local_track::{LocalTrack, MediaKind, TrackWriter};
