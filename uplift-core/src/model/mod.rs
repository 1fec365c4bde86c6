mod feedback;
mod matching;
mod participant;
mod roster;
mod session;
mod signaling;

pub use feedback::{Feedback, MAX_FEEDBACK_TEXT, SCALE_MAX, SCALE_MIN, SessionCompleted};
pub use matching::{
    CancelRequest, CancelResponse, EnqueueRequest, EnqueueResponse, MatchInfo, PollRequest,
    PollResponse,
};
pub use participant::{
    MAX_DISPLAY_NAME, ParticipantId, ParticipantState, Role, validate_display_name,
};
pub use roster::RosterEntry;
pub use session::{EndReason, SessionId};
pub use signaling::{ClientSignal, Frame, IceServerConfig, ServerSignal};
