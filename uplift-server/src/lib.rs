pub mod api;
pub mod config;
pub mod queue;
pub mod server;
pub mod signaling;

pub use config::ServerConfig;
pub use queue::*;
pub use server::{AppState, UpliftServer, build_router};
pub use signaling::*;
