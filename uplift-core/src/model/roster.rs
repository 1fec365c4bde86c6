use crate::model::participant::{ParticipantId, ParticipantState, Role};
use serde::{Deserialize, Serialize};

/// One line of the directory display. Never a matching source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: ParticipantId,
    pub display_name: String,
    pub role: Role,
    pub state: ParticipantState,
}
