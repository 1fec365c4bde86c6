use crate::error::ErrorCode;
use crate::model::feedback::Feedback;
use crate::model::participant::{ParticipantId, Role};
use crate::model::roster::RosterEntry;
use crate::model::session::{EndReason, SessionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Messages an endpoint sends to the relay. Unknown `type` values fail to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientSignal {
    Register {
        display_name: String,
        role: Role,
        #[serde(default)]
        rating_hint: Option<f64>,
    },
    OfferCall {
        to_participant_id: ParticipantId,
        session_id: SessionId,
        sdp_offer: String,
    },
    AcceptCall {
        session_id: SessionId,
        sdp_answer: String,
    },
    DeclineCall {
        session_id: SessionId,
    },
    Candidate {
        session_id: SessionId,
        candidate: String,
    },
    /// Fresh offer inside an established session (track change or ICE restart).
    Renegotiate {
        session_id: SessionId,
        sdp_offer: String,
    },
    RenegotiateAnswer {
        session_id: SessionId,
        sdp_answer: String,
    },
    EndCall {
        session_id: SessionId,
    },
    Feedback {
        session_id: SessionId,
        #[serde(flatten)]
        feedback: Feedback,
    },
}

impl ClientSignal {
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            ClientSignal::Register { .. } => None,
            ClientSignal::OfferCall { session_id, .. }
            | ClientSignal::AcceptCall { session_id, .. }
            | ClientSignal::DeclineCall { session_id }
            | ClientSignal::Candidate { session_id, .. }
            | ClientSignal::Renegotiate { session_id, .. }
            | ClientSignal::RenegotiateAnswer { session_id, .. }
            | ClientSignal::EndCall { session_id }
            | ClientSignal::Feedback { session_id, .. } => Some(*session_id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientSignal::Register { .. } => "register",
            ClientSignal::OfferCall { .. } => "offerCall",
            ClientSignal::AcceptCall { .. } => "acceptCall",
            ClientSignal::DeclineCall { .. } => "declineCall",
            ClientSignal::Candidate { .. } => "candidate",
            ClientSignal::Renegotiate { .. } => "renegotiate",
            ClientSignal::RenegotiateAnswer { .. } => "renegotiateAnswer",
            ClientSignal::EndCall { .. } => "endCall",
            ClientSignal::Feedback { .. } => "feedback",
        }
    }
}

/// Messages the relay sends to an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerSignal {
    Registered {
        participant_id: ParticipantId,
    },
    IceConfig {
        ice_servers: Vec<IceServerConfig>,
    },
    Roster {
        participants: Vec<RosterEntry>,
    },
    IncomingCall {
        from_participant_id: ParticipantId,
        session_id: SessionId,
        sdp_offer: String,
    },
    CallAccepted {
        session_id: SessionId,
        sdp_answer: String,
    },
    CallDeclined {
        session_id: SessionId,
    },
    Candidate {
        session_id: SessionId,
        candidate: String,
    },
    Renegotiate {
        session_id: SessionId,
        sdp_offer: String,
    },
    RenegotiateAnswer {
        session_id: SessionId,
        sdp_answer: String,
    },
    CallEnded {
        session_id: SessionId,
        reason: EndReason,
    },
    PeerReconnecting {
        session_id: SessionId,
    },
    PeerReconnected {
        session_id: SessionId,
    },
    ServerError {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
}

impl ServerSignal {
    /// Session the signal belongs to, if it is session-scoped.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            ServerSignal::Registered { .. }
            | ServerSignal::IceConfig { .. }
            | ServerSignal::Roster { .. } => None,
            ServerSignal::IncomingCall { session_id, .. }
            | ServerSignal::CallAccepted { session_id, .. }
            | ServerSignal::CallDeclined { session_id }
            | ServerSignal::Candidate { session_id, .. }
            | ServerSignal::Renegotiate { session_id, .. }
            | ServerSignal::RenegotiateAnswer { session_id, .. }
            | ServerSignal::CallEnded { session_id, .. }
            | ServerSignal::PeerReconnecting { session_id }
            | ServerSignal::PeerReconnected { session_id } => Some(*session_id),
            ServerSignal::ServerError { session_id, .. } => *session_id,
        }
    }
}

/// Server-to-client envelope. `seq` increases by one per frame on a connection binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub seq: u64,
    pub signal: ServerSignal,
}
