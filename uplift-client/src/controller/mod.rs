mod candidate_buffer;
mod peer_controller;

pub use candidate_buffer::CandidateBuffer;
pub use peer_controller::{ControllerEvent, ControllerSettings, PeerController, PeerState};
