use crate::model::participant::{ParticipantId, Role};
use serde::{Deserialize, Serialize};

/// The partner a participant has been paired with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    pub partner_id: ParticipantId,
    pub partner_role: Role,
    pub partner_display_name: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub participant_id: ParticipantId,
    pub role: Role,
    pub display_name: String,
    /// Display-time rating hint. Never used to order matching.
    #[serde(default)]
    pub priority_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum EnqueueResponse {
    Match { partner: MatchInfo },
    Queued { position: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    pub participant_id: ParticipantId,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PollResponse {
    Match { partner: MatchInfo },
    Waiting { position: usize },
    /// `expired` is set when the entry was evicted by the TTL sweep.
    NotQueued { expired: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub participant_id: ParticipantId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub ok: bool,
}
