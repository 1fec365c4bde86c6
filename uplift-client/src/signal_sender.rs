use async_trait::async_trait;
use uplift_core::{ClientSignal, UpliftError};

/// Outbound half of the relay connection, as seen by a call.
#[async_trait]
pub trait SignalSender: Send + Sync {
    /// Fails with `Timeout` when the relay link cannot accept the signal in time.
    async fn send(&self, signal: ClientSignal) -> Result<(), UpliftError>;
}
