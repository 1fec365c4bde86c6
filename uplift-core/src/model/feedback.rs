use crate::error::UpliftError;
use crate::model::participant::ParticipantId;
use crate::model::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SCALE_MIN: u8 = 1;
pub const SCALE_MAX: u8 = 5;
pub const MAX_FEEDBACK_TEXT: usize = 2000;

/// Post-call form the Seeker submits before a session is fully closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub mood_before: u8,
    pub mood_after: u8,
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub misconduct_flag: bool,
}

impl Feedback {
    pub fn validate(&self) -> Result<(), UpliftError> {
        let on_scale = |v: u8| (SCALE_MIN..=SCALE_MAX).contains(&v);

        if !on_scale(self.mood_before) {
            return Err(UpliftError::InvalidFeedback(format!(
                "moodBefore must be between {SCALE_MIN} and {SCALE_MAX}"
            )));
        }
        if !on_scale(self.mood_after) {
            return Err(UpliftError::InvalidFeedback(format!(
                "moodAfter must be between {SCALE_MIN} and {SCALE_MAX}"
            )));
        }
        if !on_scale(self.rating) {
            return Err(UpliftError::InvalidFeedback(format!(
                "rating must be between {SCALE_MIN} and {SCALE_MAX}"
            )));
        }
        if let Some(text) = &self.text {
            if text.chars().count() > MAX_FEEDBACK_TEXT {
                return Err(UpliftError::InvalidFeedback(format!(
                    "text is limited to {MAX_FEEDBACK_TEXT} characters"
                )));
            }
        }
        Ok(())
    }
}

/// Emitted once per finished session for the persistence and billing collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompleted {
    pub session_id: SessionId,
    pub seeker_id: ParticipantId,
    pub responder_id: ParticipantId,
    pub duration_seconds: u64,
    pub rating: u8,
    pub mood_before: u8,
    pub mood_after: u8,
    pub feedback_text: Option<String>,
    pub misconduct_flag: bool,
    pub completed_at: DateTime<Utc>,
}
