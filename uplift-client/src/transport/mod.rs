mod peer_transport;
mod webrtc_transport;

pub use peer_transport::{PeerTransport, SdpKind, SenderId, TransportEvent, TransportState};
pub use webrtc_transport::WebRtcTransport;
