use crate::queue::{
    EnqueueOutcome, MatchObserver, PollOutcome, QueueBook, QueueCommand, QueueStats,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uplift_core::{
    EnqueueRequest, EnqueueResponse, ParticipantId, PollResponse, UpliftError,
};

const COMMAND_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub ttl: Duration,
    pub sweep_interval: Duration,
    pub request_timeout: Duration,
}

/// Cloneable handle to the queue actor.
#[derive(Clone)]
pub struct QueueManager {
    command_tx: mpsc::Sender<QueueCommand>,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

impl QueueManager {
    /// Spawns the queue actor. It stops when `shutdown` is called or `token` is cancelled.
    pub fn spawn(
        settings: QueueSettings,
        observer: Arc<dyn MatchObserver>,
        token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let worker = QueueWorker {
            book: QueueBook::new(settings.ttl),
            command_rx,
            observer,
            sweep_interval: settings.sweep_interval,
            shutdown: token.clone(),
        };
        let handle = tokio::spawn(worker.run());

        let manager = Self {
            command_tx,
            request_timeout: settings.request_timeout,
            shutdown: token,
        };
        (manager, handle)
    }

    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<EnqueueResponse, UpliftError> {
        self.request(|reply| QueueCommand::Enqueue { request, reply })
            .await
    }

    pub async fn poll_status(
        &self,
        participant_id: ParticipantId,
    ) -> Result<PollResponse, UpliftError> {
        self.request(|reply| QueueCommand::Poll {
            participant_id,
            reply,
        })
        .await
    }

    pub async fn cancel(&self, participant_id: ParticipantId) -> Result<bool, UpliftError> {
        self.request(|reply| QueueCommand::Cancel {
            participant_id,
            reply,
        })
        .await
    }

    pub async fn stats(&self) -> Result<QueueStats, UpliftError> {
        self.request(|reply| QueueCommand::Stats { reply }).await
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> QueueCommand,
    ) -> Result<R, UpliftError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        let exchange = async {
            self.command_tx
                .send(make(reply_tx))
                .await
                .map_err(|_| UpliftError::ChannelClosed)?;
            reply_rx.await.map_err(|_| UpliftError::ChannelClosed)
        };

        tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| UpliftError::Timeout("queue manager"))?
    }
}

/// Sole owner of the queues. Commands and sweeps run one at a time on this task.
struct QueueWorker {
    book: QueueBook,
    command_rx: mpsc::Receiver<QueueCommand>,
    observer: Arc<dyn MatchObserver>,
    sweep_interval: Duration,
    shutdown: CancellationToken,
}

impl QueueWorker {
    async fn run(mut self) {
        info!("Queue manager started");

        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Sweeps win ties with commands so a due eviction lands before the next pop.
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Queue manager shutting down");
                    break;
                }

                _ = sweep.tick() => self.sweep(),

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => self.handle_command(c),
                        None => {
                            info!("Queue command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("Queue manager stopped");
    }

    fn handle_command(&mut self, cmd: QueueCommand) {
        let now = Instant::now();

        match cmd {
            QueueCommand::Enqueue { request, reply } => {
                let participant_id = request.participant_id;
                let (outcome, record) = self.book.enqueue(
                    participant_id,
                    request.role,
                    request.display_name,
                    request.priority_score,
                    now,
                );
                if let Some(record) = record {
                    info!(
                        "Matched seeker {} with responder {}",
                        record.seeker, record.responder
                    );
                    self.observer.on_match(record);
                }

                let response = match outcome {
                    EnqueueOutcome::Matched(partner) => EnqueueResponse::Match { partner },
                    EnqueueOutcome::Queued { position } => {
                        debug!("{} queued as {} at {}", participant_id, request.role, position);
                        EnqueueResponse::Queued { position }
                    }
                };
                let _ = reply.send(response);
            }

            QueueCommand::Poll {
                participant_id,
                reply,
            } => {
                let (outcome, record) = self.book.poll(participant_id, now);
                if let Some(record) = record {
                    info!(
                        "Matched seeker {} with responder {} on poll",
                        record.seeker, record.responder
                    );
                    self.observer.on_match(record);
                }

                let response = match outcome {
                    PollOutcome::Matched(partner) => PollResponse::Match { partner },
                    PollOutcome::StillWaiting { position } => PollResponse::Waiting { position },
                    PollOutcome::NotQueued => PollResponse::NotQueued { expired: false },
                    PollOutcome::Expired => PollResponse::NotQueued { expired: true },
                };
                let _ = reply.send(response);
            }

            QueueCommand::Cancel {
                participant_id,
                reply,
            } => {
                let removed = self.book.cancel(participant_id);
                if removed {
                    debug!("{} left the queue", participant_id);
                }
                let _ = reply.send(removed);
            }

            QueueCommand::Stats { reply } => {
                let _ = reply.send(self.book.stats());
            }
        }
    }

    fn sweep(&mut self) {
        let report = self.book.sweep(Instant::now());
        if !report.evicted_entries.is_empty() || report.evicted_matches > 0 {
            info!(
                "Queue sweep evicted {} entries and {} pending matches",
                report.evicted_entries.len(),
                report.evicted_matches
            );
        }
    }
}
