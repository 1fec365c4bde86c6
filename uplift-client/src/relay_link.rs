use crate::registry::{Subscription, SubscriptionRegistry};
use crate::signal_sender::SignalSender;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uplift_core::{
    ClientSignal, Frame, IceServerConfig, ParticipantId, Role, RosterEntry, ServerSignal,
    SessionId, UpliftError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OUTBOUND_CAPACITY: usize = 64;
const FIRST_RETRY: Duration = Duration::from_millis(100);
const MAX_RETRY: Duration = Duration::from_secs(2);

/// What the relay learns about us on `register`.
#[derive(Debug, Clone)]
pub struct RelayProfile {
    pub display_name: String,
    pub role: Role,
    pub rating_hint: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct LinkSettings {
    /// Bound on one send, and on one connection attempt.
    pub send_timeout: Duration,
    /// How long a dropped connection keeps being re-established before the link gives up.
    pub reconnect_window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Reconnecting,
    Closed,
}

/// Persistent connection to the signaling relay.
///
/// Session-scoped frames go to the matching [`Subscription`]; everything else
/// (incoming calls, errors outside a session) lands in the lobby. A dropped
/// connection is re-registered under the same participant id. Subscriptions
/// stay open meanwhile and outgoing signals wait for the new connection; they
/// are only closed once reconnecting gives up.
pub struct RelayLink {
    participant_id: ParticipantId,
    outbound: mpsc::Sender<ClientSignal>,
    registry: Arc<SubscriptionRegistry>,
    lobby: Mutex<mpsc::UnboundedReceiver<ServerSignal>>,
    roster: watch::Receiver<Vec<RosterEntry>>,
    ice_servers: watch::Receiver<Vec<IceServerConfig>>,
    status: watch::Receiver<LinkStatus>,
    send_timeout: Duration,
    token: CancellationToken,
    supervisor: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl RelayLink {
    /// Connects, registers and waits for the `registered` + `iceConfig` greeting.
    pub async fn connect(
        url: &str,
        participant_id: ParticipantId,
        profile: RelayProfile,
        settings: LinkSettings,
    ) -> Result<Arc<Self>> {
        let dialer = Dialer {
            url: url.to_string(),
            participant_id,
            profile,
            timeout: settings.send_timeout,
        };
        let (connection, ice_servers) = dialer.dial().await?;
        info!("Registered with the relay as {}", participant_id);

        let registry = Arc::new(SubscriptionRegistry::new());
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (lobby_tx, lobby_rx) = mpsc::unbounded_channel();
        let (roster_tx, roster_rx) = watch::channel(Vec::new());
        let (ice_tx, ice_rx) = watch::channel(ice_servers);
        let (status_tx, status_rx) = watch::channel(LinkStatus::Connected);
        let token = CancellationToken::new();

        let supervisor = Supervisor {
            dialer,
            router: Router {
                registry: Arc::clone(&registry),
                lobby: lobby_tx,
                roster: roster_tx,
                ice_servers: ice_tx,
            },
            outbound: outbound_rx,
            status: status_tx,
            reconnect_window: settings.reconnect_window,
            token: token.clone(),
        };
        let task = tokio::spawn(supervisor.run(connection));

        Ok(Arc::new(Self {
            participant_id,
            outbound: outbound_tx,
            registry,
            lobby: Mutex::new(lobby_rx),
            roster: roster_rx,
            ice_servers: ice_rx,
            status: status_rx,
            send_timeout: settings.send_timeout,
            token,
            supervisor: parking_lot::Mutex::new(Some(task)),
        }))
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    /// Listens for frames of `session_id` until the subscription is dropped.
    pub fn subscribe(&self, session_id: SessionId) -> Subscription {
        Subscription::new(Arc::clone(&self.registry), session_id)
    }

    /// Next signal that belongs to no live session.
    pub async fn next_lobby(&self, timeout: Duration) -> Result<ServerSignal, UpliftError> {
        let mut lobby = self.lobby.lock().await;
        match tokio::time::timeout(timeout, lobby.recv()).await {
            Ok(Some(signal)) => Ok(signal),
            Ok(None) => Err(UpliftError::ChannelClosed),
            Err(_) => Err(UpliftError::Timeout("relay signal")),
        }
    }

    /// Latest roster broadcast.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.roster.borrow().clone()
    }

    pub fn roster_updates(&self) -> watch::Receiver<Vec<RosterEntry>> {
        self.roster.clone()
    }

    /// ICE servers announced by the relay.
    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.ice_servers.borrow().clone()
    }

    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    pub fn status_updates(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn close(&self) {
        self.token.cancel();
        let task = self.supervisor.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!("Relay task ended abnormally: {}", e);
        }
        self.registry.clear();
    }
}

impl Drop for RelayLink {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[async_trait]
impl SignalSender for RelayLink {
    async fn send(&self, signal: ClientSignal) -> Result<(), UpliftError> {
        if self.token.is_cancelled() {
            return Err(UpliftError::ChannelClosed);
        }
        self.outbound
            .send_timeout(signal, self.send_timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => UpliftError::Timeout("relay send"),
                mpsc::error::SendTimeoutError::Closed(_) => UpliftError::ChannelClosed,
            })
    }
}

/// One registered WebSocket connection.
struct Connection {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    last_seq: u64,
}

struct Dialer {
    url: String,
    participant_id: ParticipantId,
    profile: RelayProfile,
    timeout: Duration,
}

impl Dialer {
    async fn dial(&self) -> Result<(Connection, Vec<IceServerConfig>)> {
        let connecting = tokio_tungstenite::connect_async(self.url.as_str());
        let (ws, _) = tokio::time::timeout(self.timeout, connecting)
            .await
            .context("timed out connecting to the relay")?
            .with_context(|| format!("failed to connect to {}", self.url))?;
        let (mut sink, mut stream) = ws.split();

        let register = ClientSignal::Register {
            display_name: self.profile.display_name.clone(),
            role: self.profile.role,
            rating_hint: self.profile.rating_hint,
        };
        sink.send(Message::Text(serde_json::to_string(&register)?.into()))
            .await
            .context("failed to send register")?;

        let (ice_servers, last_seq) = tokio::time::timeout(
            self.timeout,
            await_greeting(&mut stream, self.participant_id),
        )
        .await
        .context("timed out waiting for the relay greeting")??;

        Ok((
            Connection {
                sink,
                stream,
                last_seq,
            },
            ice_servers,
        ))
    }
}

async fn await_greeting(
    stream: &mut SplitStream<WsStream>,
    participant_id: ParticipantId,
) -> Result<(Vec<IceServerConfig>, u64)> {
    let mut registered = false;
    while let Some(msg) = stream.next().await {
        let Message::Text(text) = msg? else {
            continue;
        };
        let frame: Frame = serde_json::from_str(text.as_str())?;
        match frame.signal {
            ServerSignal::Registered { participant_id: id } if id == participant_id => {
                registered = true;
            }
            ServerSignal::IceConfig { ice_servers } if registered => {
                return Ok((ice_servers, frame.seq));
            }
            ServerSignal::ServerError { code, message, .. } => {
                bail!("relay rejected registration ({code:?}): {message}");
            }
            other => debug!("Ignoring {:?} before registration completed", other),
        }
    }
    bail!("relay closed the connection during registration")
}

enum LinkEnd {
    Closed,
    /// The connection dropped. Carries the signal that was being written, if any.
    Dropped(Option<ClientSignal>),
}

struct Supervisor {
    dialer: Dialer,
    router: Router,
    outbound: mpsc::Receiver<ClientSignal>,
    status: watch::Sender<LinkStatus>,
    reconnect_window: Duration,
    token: CancellationToken,
}

impl Supervisor {
    async fn run(mut self, mut connection: Connection) {
        let mut unsent = None;
        loop {
            match self.pump(connection, unsent.take()).await {
                LinkEnd::Closed => break,
                LinkEnd::Dropped(pending) => unsent = pending,
            }

            self.status.send_replace(LinkStatus::Reconnecting);
            warn!(
                "Lost the relay connection, reconnecting for up to {:?}",
                self.reconnect_window
            );
            match self.redial().await {
                Some(next) => {
                    connection = next;
                    self.status.send_replace(LinkStatus::Connected);
                    info!("Re-registered with the relay as {}", self.dialer.participant_id);
                }
                None => break,
            }
        }

        // Closing the listeners tells every running session the relay is gone.
        self.status.send_replace(LinkStatus::Closed);
        self.router.registry.clear();
        self.token.cancel();
    }

    /// Moves frames both ways until the connection drops or the link is closed.
    async fn pump(&mut self, connection: Connection, unsent: Option<ClientSignal>) -> LinkEnd {
        let Connection {
            mut sink,
            mut stream,
            mut last_seq,
        } = connection;

        if let Some(signal) = unsent
            && let Err(signal) = write_signal(&mut sink, signal).await
        {
            return LinkEnd::Dropped(Some(signal));
        }

        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    let _ = sink.close().await;
                    return LinkEnd::Closed;
                }
                signal = self.outbound.recv() => {
                    let Some(signal) = signal else {
                        let _ = sink.close().await;
                        return LinkEnd::Closed;
                    };
                    if let Err(signal) = write_signal(&mut sink, signal).await {
                        return LinkEnd::Dropped(Some(signal));
                    }
                }
                msg = stream.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Relay closed the connection");
                            return LinkEnd::Dropped(None);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!("Relay connection error: {}", e);
                            return LinkEnd::Dropped(None);
                        }
                    };

                    let frame: Frame = match serde_json::from_str(text.as_str()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("Unreadable frame from the relay: {}", e);
                            continue;
                        }
                    };
                    if frame.seq != last_seq + 1 {
                        warn!(
                            "Relay sequence gap: expected {}, got {}",
                            last_seq + 1,
                            frame.seq
                        );
                    }
                    last_seq = frame.seq;
                    self.router.route(frame.signal);
                }
            }
        }
    }

    /// Retries with backoff until the reconnect window closes. `None` means give up.
    async fn redial(&mut self) -> Option<Connection> {
        let deadline = Instant::now() + self.reconnect_window;
        let mut backoff = FIRST_RETRY;

        loop {
            let attempt = tokio::select! {
                _ = self.token.cancelled() => return None,
                attempt = tokio::time::timeout_at(deadline, self.dialer.dial()) => attempt,
            };
            match attempt {
                Ok(Ok((connection, ice_servers))) => {
                    self.router.ice_servers.send_replace(ice_servers);
                    return Some(connection);
                }
                Ok(Err(e)) => debug!("Relay reconnect attempt failed: {:#}", e),
                Err(_) => break,
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::select! {
                _ = self.token.cancelled() => return None,
                _ = tokio::time::sleep(backoff.min(deadline - now)) => {}
            }
            backoff = (backoff * 2).min(MAX_RETRY);
        }

        error!(
            "Could not reach the relay within {:?}, giving up",
            self.reconnect_window
        );
        None
    }
}

/// Writes one signal. Gives it back if the connection is gone.
async fn write_signal(
    sink: &mut SplitSink<WsStream, Message>,
    signal: ClientSignal,
) -> Result<(), ClientSignal> {
    let json = match serde_json::to_string(&signal) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize {}: {}", signal.kind(), e);
            return Ok(());
        }
    };
    if let Err(e) = sink.send(Message::Text(json.into())).await {
        warn!("Relay send failed: {}", e);
        return Err(signal);
    }
    Ok(())
}

struct Router {
    registry: Arc<SubscriptionRegistry>,
    lobby: mpsc::UnboundedSender<ServerSignal>,
    roster: watch::Sender<Vec<RosterEntry>>,
    ice_servers: watch::Sender<Vec<IceServerConfig>>,
}

impl Router {
    fn route(&self, signal: ServerSignal) {
        match signal {
            ServerSignal::Roster { participants } => {
                self.roster.send_replace(participants);
            }
            ServerSignal::IceConfig { ice_servers } => {
                self.ice_servers.send_replace(ice_servers);
            }
            ServerSignal::Registered { participant_id } => {
                debug!("Registration confirmed again for {}", participant_id);
            }
            ServerSignal::IncomingCall { .. } => {
                let _ = self.lobby.send(signal);
            }
            signal => {
                let signal = match signal.session_id() {
                    Some(session_id) => match self.registry.dispatch(session_id, signal) {
                        Ok(()) => return,
                        Err(signal) => signal,
                    },
                    None => signal,
                };
                let _ = self.lobby.send(signal);
            }
        }
    }
}
