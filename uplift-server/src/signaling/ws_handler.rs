use crate::signaling::{PeerProfile, SignalingRelay};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uplift_core::{
    ClientSignal, Frame, ParticipantId, ServerSignal, UpliftError, validate_display_name,
};

const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(participant_id): Path<String>,
    State(relay): State<SignalingRelay>,
) -> Response {
    let participant_id = match participant_id.parse::<ParticipantId>() {
        Ok(id) => id,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("invalid participant id: {e}"))
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, participant_id, relay))
}

async fn handle_socket(socket: WebSocket, participant_id: ParticipantId, relay: SignalingRelay) {
    info!("New WebSocket connection: {}", participant_id);

    let (mut sender, mut receiver) = socket.split();

    let profile = match tokio::time::timeout(REGISTER_TIMEOUT, await_register(&mut receiver)).await
    {
        Ok(Ok(profile)) => profile,
        Ok(Err(e)) => {
            warn!("Rejecting connection of {}: {}", participant_id, e);
            let frame = Frame {
                seq: 0,
                signal: ServerSignal::ServerError {
                    code: e.code(),
                    message: e.to_string(),
                    session_id: None,
                },
            };
            if let Some(msg) = encode(&frame) {
                let _ = sender.send(msg).await;
            }
            let _ = sender.close().await;
            return;
        }
        Err(_) => {
            warn!("{} never registered, closing", participant_id);
            let _ = sender.close().await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let connection_id = relay.register(participant_id, profile, tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Some(msg) = encode(&frame) else {
                continue;
            };
            if sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let mut recv_task = tokio::spawn({
        let relay = relay.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientSignal>(&text) {
                        Ok(signal) => {
                            let kind = signal.kind();
                            let session_id = signal.session_id();
                            if let Err(e) = relay.handle(participant_id, signal).await {
                                warn!("{} from {} rejected: {}", kind, participant_id, e);
                                relay.report_error(participant_id, &e, session_id);
                            }
                        }
                        Err(e) => {
                            warn!("Invalid signal from {}: {}", participant_id, e);
                            relay.report_error(
                                participant_id,
                                &UpliftError::InvalidMessage(e.to_string()),
                                None,
                            );
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    relay.disconnect(participant_id, connection_id);
    info!("WebSocket disconnected: {}", participant_id);
}

/// Reads until the first text frame, which must be a `register`.
async fn await_register(
    receiver: &mut SplitStream<WebSocket>,
) -> Result<PeerProfile, UpliftError> {
    while let Some(msg) = receiver.next().await {
        let msg = msg.map_err(|e| UpliftError::Transport(e.to_string()))?;
        match msg {
            Message::Text(text) => {
                return match serde_json::from_str::<ClientSignal>(&text) {
                    Ok(ClientSignal::Register {
                        display_name,
                        role,
                        rating_hint,
                    }) => {
                        validate_display_name(&display_name)?;
                        Ok(PeerProfile {
                            display_name,
                            role,
                            rating_hint,
                        })
                    }
                    Ok(other) => Err(UpliftError::InvalidMessage(format!(
                        "expected register, got {}",
                        other.kind()
                    ))),
                    Err(e) => Err(UpliftError::InvalidMessage(e.to_string())),
                };
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(UpliftError::ChannelClosed)
}

fn encode(frame: &Frame) -> Option<Message> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            error!("Failed to serialize frame: {}", e);
            None
        }
    }
}
