use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uplift_client::{ClientConfig, LinkSettings, QueueClient, RelayLink, RelayProfile};
use uplift_core::{EnqueueRequest, ParticipantId, Role};
use uplift_server::{ServerConfig, UpliftServer};

/// A real server on an ephemeral port, shut down on drop.
pub struct TestServer {
    pub addr: SocketAddr,
    token: CancellationToken,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        Self::start_with(ServerConfig {
            roster_interval_secs: 1,
            sweep_interval_ms: 50,
            ..ServerConfig::default()
        })
        .await
    }

    pub async fn start_with(config: ServerConfig) -> Result<Self> {
        let server = UpliftServer::new(config);
        let token = server.shutdown_token();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                tracing::error!("test server failed: {e:#}");
            }
        });

        Ok(Self { addr, token })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            server_url: self.base_url(),
            poll_interval_ms: 50,
            ..ClientConfig::default()
        }
    }

    pub fn queue(&self) -> QueueClient {
        QueueClient::new(self.base_url(), Duration::from_secs(5))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub fn enqueue_request(participant_id: ParticipantId, role: Role, name: &str) -> EnqueueRequest {
    EnqueueRequest {
        participant_id,
        role,
        display_name: name.to_string(),
        priority_score: 0.0,
    }
}

/// Registers `participant_id` with the relay at `url`.
pub async fn connect_link(
    url: &str,
    participant_id: ParticipantId,
    role: Role,
    name: &str,
    reconnect_window: Duration,
) -> Arc<RelayLink> {
    let profile = RelayProfile {
        display_name: name.to_string(),
        role,
        rating_hint: None,
    };
    let settings = LinkSettings {
        send_timeout: Duration::from_secs(5),
        reconnect_window,
    };
    RelayLink::connect(url, participant_id, profile, settings)
        .await
        .unwrap()
}
