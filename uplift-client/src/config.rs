use crate::relay_link::LinkSettings;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use uplift_core::IceServerConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// HTTP base URL of the server, e.g. `http://127.0.0.1:3000`.
    pub server_url: String,
    /// Used until the relay sends its own `iceConfig`.
    pub ice_servers: Vec<IceServerConfig>,
    /// Hard cap on a running session.
    pub session_limit_secs: u64,
    pub poll_interval_ms: u64,
    /// Upper bound for one HTTP call or one relay send.
    pub request_timeout_ms: u64,
    /// How long negotiation (or a reconnection) may take before the call fails.
    pub negotiation_timeout_secs: u64,
    /// How long a matched responder waits for the seeker's offer.
    pub incoming_call_timeout_secs: u64,
    /// Give up matching after this long. Zero waits forever.
    pub match_timeout_secs: u64,
    /// How long a finished call waits for the seeker's feedback.
    pub feedback_timeout_secs: u64,
    pub max_ice_restarts: u32,
    /// How long a dropped relay connection is retried. Matches the relay's grace window.
    pub relay_reconnect_secs: u64,
    pub video: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".to_string(),
            ice_servers: vec![IceServerConfig::stun("stun:stun.l.google.com:19302")],
            session_limit_secs: 7 * 60,
            poll_interval_ms: 1000,
            request_timeout_ms: 5000,
            negotiation_timeout_secs: 30,
            incoming_call_timeout_secs: 30,
            match_timeout_secs: 0,
            feedback_timeout_secs: 600,
            max_ice_restarts: 1,
            relay_reconnect_secs: 15,
            video: false,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = env::var("UPLIFT_SERVER_URL") {
            config.server_url = url;
        }
        if let Ok(raw) = env::var("UPLIFT_SESSION_LIMIT_SECS") {
            config.session_limit_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid value for UPLIFT_SESSION_LIMIT_SECS: '{raw}'"))?;
        }
        Ok(config)
    }

    /// WebSocket URL of the relay endpoint for `participant_id`.
    pub fn relay_url(&self, participant_id: impl std::fmt::Display) -> Result<String> {
        let base = self.server_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            bail!("unsupported server url '{}'", self.server_url);
        };
        Ok(format!("{ws_base}/ws/{participant_id}"))
    }

    pub fn session_limit(&self) -> Duration {
        Duration::from_secs(self.session_limit_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_secs)
    }

    pub fn incoming_call_timeout(&self) -> Duration {
        Duration::from_secs(self.incoming_call_timeout_secs)
    }

    pub fn feedback_timeout(&self) -> Duration {
        Duration::from_secs(self.feedback_timeout_secs)
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            send_timeout: self.request_timeout(),
            reconnect_window: Duration::from_secs(self.relay_reconnect_secs),
        }
    }

    pub fn match_timeout(&self) -> Option<Duration> {
        (self.match_timeout_secs > 0).then(|| Duration::from_secs(self.match_timeout_secs))
    }
}
