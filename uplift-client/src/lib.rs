pub mod call;
pub mod config;
pub mod controller;
pub mod media;
pub mod queue_client;
pub mod registry;
pub mod relay_link;
pub mod session;
pub mod signal_sender;
pub mod transport;

pub use call::{CallClient, CallHandle};
pub use config::ClientConfig;
pub use controller::{ControllerEvent, ControllerSettings, PeerController, PeerState};
pub use media::{LocalTrack, MediaDevices, MediaKind, SampleDevices};
pub use queue_client::QueueClient;
pub use registry::{Subscription, SubscriptionRegistry};
pub use relay_link::{LinkSettings, LinkStatus, RelayLink, RelayProfile};
pub use session::{SessionCoordinator, SessionEvent, SessionOutcome, SessionSetup, SessionStart};
pub use signal_sender::SignalSender;
pub use transport::{PeerTransport, SdpKind, SenderId, TransportEvent, TransportState};
