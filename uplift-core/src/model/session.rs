use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Hash, Eq, PartialEq)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a call ended. Every exit path funnels through one of these.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// Local user hung up.
    Hangup,
    /// The other side sent `endCall`.
    RemoteEnded,
    /// The session duration cap elapsed.
    Expired,
    /// The callee declined the offer.
    Declined,
    /// A participant's connection dropped and did not come back within the grace window.
    ConnectionLost,
    /// Negotiation or media failed terminally.
    Failed,
}

impl EndReason {
    /// True when this side initiated the end and must notify the peer.
    pub fn is_local(self) -> bool {
        matches!(self, EndReason::Hangup | EndReason::Expired | EndReason::Failed)
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::Hangup => "hangup",
            EndReason::RemoteEnded => "remote ended",
            EndReason::Expired => "expired",
            EndReason::Declined => "declined",
            EndReason::ConnectionLost => "connection lost",
            EndReason::Failed => "failed",
        };
        f.write_str(s)
    }
}
