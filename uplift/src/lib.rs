pub use uplift_core::{ErrorCode, ParticipantId, Role, SessionId, UpliftError};

pub mod model {
    pub use uplift_core::model::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use uplift_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use uplift_client::*;
}
