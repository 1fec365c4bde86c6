mod call_session;
mod relay;
mod session_sink;
mod ws_handler;

pub use call_session::*;
pub use relay::*;
pub use session_sink::*;
pub use ws_handler::*;
