use crate::error::UpliftError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Anonymous participant handle. Stable across reconnects of the same client.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ParticipantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const MAX_DISPLAY_NAME: usize = 64;

/// Display names must be non-blank and at most [`MAX_DISPLAY_NAME`] characters.
pub fn validate_display_name(name: &str) -> Result<(), UpliftError> {
    if name.trim().is_empty() {
        return Err(UpliftError::InvalidMessage(
            "displayName must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_DISPLAY_NAME {
        return Err(UpliftError::InvalidMessage(format!(
            "displayName is longer than {MAX_DISPLAY_NAME} characters"
        )));
    }
    Ok(())
}

/// Which side of a session a participant plays.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Asks for support. Owes feedback once a session ends.
    #[serde(alias = "hero")]
    Seeker,
    /// Provides support.
    #[serde(alias = "uplifter")]
    Responder,
}

impl Role {
    pub fn opposite(self) -> Self {
        match self {
            Role::Seeker => Role::Responder,
            Role::Responder => Role::Seeker,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Seeker => f.write_str("seeker"),
            Role::Responder => f.write_str("responder"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "seeker" | "hero" => Ok(Role::Seeker),
            "responder" | "uplifter" => Ok(Role::Responder),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Coarse participant state, as shown in the roster.
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParticipantState {
    #[default]
    Idle,
    Queued,
    Negotiating,
    Connected,
    Ending,
}
