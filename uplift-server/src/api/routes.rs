use crate::api::ApiError;
use crate::server::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;
use tracing::debug;
use uplift_core::{
    CancelRequest, CancelResponse, EnqueueRequest, EnqueueResponse, ParticipantState, PollRequest,
    PollResponse, UpliftError, validate_display_name,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub queued: usize,
    pub online: usize,
}

pub async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    validate_display_name(&request.display_name)?;
    if !request.priority_score.is_finite() {
        return Err(UpliftError::InvalidMessage("priorityScore must be finite".to_string()).into());
    }

    let participant_id = request.participant_id;
    // Set before the queue runs so a match reported by the observer overrides it.
    state.relay.set_state(participant_id, ParticipantState::Queued);
    let response = match state.queue.enqueue(request).await {
        Ok(response) => response,
        Err(e) => {
            state.relay.set_state(participant_id, ParticipantState::Idle);
            return Err(e.into());
        }
    };
    if let EnqueueResponse::Match { .. } = response {
        state
            .relay
            .set_state(participant_id, ParticipantState::Negotiating);
    }
    debug!("enqueue {} -> {:?}", participant_id, response);
    Ok(Json(response))
}

pub async fn status(
    State(state): State<AppState>,
    Json(request): Json<PollRequest>,
) -> Result<Json<PollResponse>, ApiError> {
    let response = state.queue.poll_status(request.participant_id).await?;
    if let PollResponse::NotQueued { expired: true } = response {
        debug!("{} polled after its entry expired", request.participant_id);
        state
            .relay
            .set_state(request.participant_id, ParticipantState::Idle);
    }
    Ok(Json(response))
}

pub async fn cancel(
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, ApiError> {
    state.queue.cancel(request.participant_id).await?;
    if state.relay.state_of(request.participant_id) == Some(ParticipantState::Queued) {
        state
            .relay
            .set_state(request.participant_id, ParticipantState::Idle);
    }
    Ok(Json(CancelResponse { ok: true }))
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let stats = state.queue.stats().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        queued: stats.seekers + stats.responders,
        online: state.relay.online_count(),
    }))
}
