//! Server configuration: defaults, overlaid by `UPLIFT_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use uplift_core::IceServerConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub bind: SocketAddr,
    /// Time-to-live of an unpolled queue entry.
    pub queue_ttl_secs: u64,
    /// How often the queue sweeps stale entries.
    pub sweep_interval_ms: u64,
    /// How often the roster is broadcast to connected participants.
    pub roster_interval_secs: u64,
    /// How long a dropped participant may take to re-register before its call is lost.
    pub reconnect_grace_secs: u64,
    /// How long a queue match authorises the pair to open a session.
    pub match_ttl_secs: u64,
    /// How long an ended session waits for the seeker's feedback.
    pub feedback_window_secs: u64,
    /// Upper bound for a single queue request.
    pub request_timeout_ms: u64,
    /// STUN/TURN servers handed to endpoints on registration.
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            queue_ttl_secs: 30,
            sweep_interval_ms: 1000,
            roster_interval_secs: 5,
            reconnect_grace_secs: 15,
            match_ttl_secs: 60,
            feedback_window_secs: 600,
            request_timeout_ms: 5000,
            ice_servers: vec![IceServerConfig::stun("stun:stun.l.google.com:19302")],
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid by environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(bind) = read_var::<SocketAddr>("UPLIFT_BIND")? {
            config.bind = bind;
        }
        if let Some(v) = read_var("UPLIFT_QUEUE_TTL_SECS")? {
            config.queue_ttl_secs = v;
        }
        if let Some(v) = read_var("UPLIFT_SWEEP_INTERVAL_MS")? {
            config.sweep_interval_ms = v;
        }
        if let Some(v) = read_var("UPLIFT_ROSTER_INTERVAL_SECS")? {
            config.roster_interval_secs = v;
        }
        if let Some(v) = read_var("UPLIFT_RECONNECT_GRACE_SECS")? {
            config.reconnect_grace_secs = v;
        }
        if let Some(v) = read_var("UPLIFT_MATCH_TTL_SECS")? {
            config.match_ttl_secs = v;
        }
        if let Some(v) = read_var("UPLIFT_FEEDBACK_WINDOW_SECS")? {
            config.feedback_window_secs = v;
        }
        if let Some(v) = read_var("UPLIFT_REQUEST_TIMEOUT_MS")? {
            config.request_timeout_ms = v;
        }

        if let Ok(turn_url) = env::var("TURN_URL") {
            config.ice_servers.push(IceServerConfig {
                urls: vec![turn_url],
                username: env::var("TURN_USERNAME").ok(),
                credential: env::var("TURN_CREDENTIAL").ok(),
            });
        }

        Ok(config)
    }

    pub fn queue_ttl(&self) -> Duration {
        Duration::from_secs(self.queue_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn roster_interval(&self) -> Duration {
        Duration::from_secs(self.roster_interval_secs.max(1))
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_secs(self.reconnect_grace_secs)
    }

    pub fn match_ttl(&self) -> Duration {
        Duration::from_secs(self.match_ttl_secs)
    }

    pub fn feedback_window(&self) -> Duration {
        Duration::from_secs(self.feedback_window_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn read_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid value for {name}: '{raw}'")),
        Err(_) => Ok(None),
    }
}
