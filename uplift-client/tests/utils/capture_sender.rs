use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use uplift_client::SignalSender;
use uplift_core::{ClientSignal, UpliftError};

/// Signal sender that keeps everything it was asked to send.
pub struct CaptureSender {
    sent: Mutex<Vec<ClientSignal>>,
    tx: mpsc::UnboundedSender<ClientSignal>,
    pub fail: AtomicBool,
}

impl CaptureSender {
    pub fn new() -> (Arc<Self>, SentSignals) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            tx,
            fail: AtomicBool::new(false),
        });
        (sender, SentSignals { rx })
    }

    pub fn sent(&self) -> Vec<ClientSignal> {
        self.sent.lock().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.sent.lock().iter().filter(|s| s.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl SignalSender for CaptureSender {
    async fn send(&self, signal: ClientSignal) -> Result<(), UpliftError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(UpliftError::ChannelClosed);
        }
        self.sent.lock().push(signal.clone());
        let _ = self.tx.send(signal);
        Ok(())
    }
}

/// Receiving side of a [`CaptureSender`], for tests that wait on another task.
pub struct SentSignals {
    rx: mpsc::UnboundedReceiver<ClientSignal>,
}

impl SentSignals {
    pub async fn next(&mut self) -> ClientSignal {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for a sent signal")
            .expect("sender dropped")
    }

    /// Skips candidates and returns the next signal of `kind`.
    pub async fn next_of(&mut self, kind: &str) -> ClientSignal {
        loop {
            let signal = self.next().await;
            if signal.kind() == kind {
                return signal;
            }
        }
    }

    pub fn try_next(&mut self) -> Option<ClientSignal> {
        self.rx.try_recv().ok()
    }
}
