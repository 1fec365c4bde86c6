mod coordinator;
mod lifecycle;

pub use coordinator::{
    SessionChannels, SessionCommand, SessionCoordinator, SessionEvent, SessionOutcome,
    SessionSetup, SessionStart,
};
pub use lifecycle::{SessionTimer, TimerState};
