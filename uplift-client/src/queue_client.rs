use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uplift_core::{
    CancelRequest, CancelResponse, EnqueueRequest, EnqueueResponse, ErrorCode, MatchInfo,
    ParticipantId, PollRequest, PollResponse, UpliftError,
};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
}

/// HTTP client of the matching queue.
#[derive(Clone)]
pub struct QueueClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl QueueClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub async fn enqueue(&self, request: &EnqueueRequest) -> Result<EnqueueResponse, UpliftError> {
        self.post("/queue/enqueue", request).await
    }

    pub async fn poll_status(&self, request: &PollRequest) -> Result<PollResponse, UpliftError> {
        self.post("/queue/status", request).await
    }

    /// Idempotent.
    pub async fn cancel(&self, participant_id: ParticipantId) -> Result<(), UpliftError> {
        let _: CancelResponse = self
            .post("/queue/cancel", &CancelRequest { participant_id })
            .await?;
        Ok(())
    }

    /// Enqueues and polls until matched.
    ///
    /// A lost race or an evicted entry is retried by enqueueing again. Returns
    /// `None` when `token` is cancelled; the queue entry is withdrawn first.
    pub async fn wait_for_match(
        &self,
        request: &EnqueueRequest,
        poll_interval: Duration,
        deadline: Option<Duration>,
        token: &CancellationToken,
    ) -> Result<Option<MatchInfo>, UpliftError> {
        let deadline = deadline.map(|d| Instant::now() + d);
        let poll = PollRequest {
            participant_id: request.participant_id,
            role: request.role,
        };
        let mut needs_enqueue = true;

        loop {
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                self.withdraw(request.participant_id).await;
                return Err(UpliftError::Timeout("match"));
            }

            let step = if needs_enqueue {
                self.enqueue(request).await.map(|response| match response {
                    EnqueueResponse::Match { partner } => Step::Matched(partner),
                    EnqueueResponse::Queued { position } => Step::Waiting(position),
                })
            } else {
                self.poll_status(&poll).await.map(|response| match response {
                    PollResponse::Match { partner } => Step::Matched(partner),
                    PollResponse::Waiting { position } => Step::Waiting(position),
                    PollResponse::NotQueued { expired: true } => {
                        Step::Requeue(UpliftError::StaleEntryExpired)
                    }
                    PollResponse::NotQueued { expired: false } => {
                        Step::Requeue(UpliftError::QueueRaceLost)
                    }
                })
            };

            match step {
                Ok(Step::Matched(partner)) => {
                    info!(
                        "{} matched with {} ({})",
                        request.participant_id, partner.partner_display_name, partner.partner_id
                    );
                    return Ok(Some(partner));
                }
                Ok(Step::Waiting(position)) => {
                    debug!("{} waiting at position {}", request.participant_id, position);
                    needs_enqueue = false;
                }
                Ok(Step::Requeue(reason))
                | Err(reason @ (UpliftError::QueueRaceLost | UpliftError::StaleEntryExpired)) => {
                    debug!("{}: {}, enqueueing again", request.participant_id, reason);
                    needs_enqueue = true;
                    continue;
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = token.cancelled() => {
                    self.withdraw(request.participant_id).await;
                    return Ok(None);
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    async fn withdraw(&self, participant_id: ParticipantId) {
        if let Err(e) = self.cancel(participant_id).await {
            debug!("Cancel for {} failed: {}", participant_id, e);
        }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, UpliftError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpliftError::Timeout("queue request")
                } else {
                    UpliftError::Transport(e.to_string())
                }
            })?;

        if response.status().is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| UpliftError::Transport(e.to_string()));
        }

        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => Err(UpliftError::from_wire(body.code, body.message)),
            Err(_) => Err(UpliftError::Transport(format!("{path} returned {status}"))),
        }
    }
}

enum Step {
    Matched(MatchInfo),
    Waiting(usize),
    Requeue(UpliftError),
}
