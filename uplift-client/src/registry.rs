//! Session-scoped signal subscriptions.
//!
//! Subscriptions live in an arena of generation-tagged slots. A key whose slot
//! has since been reused no longer matches, so a late unsubscribe cannot remove
//! somebody else's listener.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uplift_core::{ServerSignal, SessionId};

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct SubscriptionKey {
    index: usize,
    generation: u64,
}

struct Listener {
    session_id: SessionId,
    tx: mpsc::UnboundedSender<ServerSignal>,
}

struct Slot {
    generation: u64,
    listener: Option<Listener>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    by_session: HashMap<SessionId, SubscriptionKey>,
}

impl Arena {
    fn remove(&mut self, key: SubscriptionKey) -> bool {
        let Some(slot) = self.slots.get_mut(key.index) else {
            return false;
        };
        if slot.generation != key.generation {
            return false;
        }
        let Some(listener) = slot.listener.take() else {
            return false;
        };
        slot.generation += 1;
        self.free.push(key.index);
        if self.by_session.get(&listener.session_id) == Some(&key) {
            self.by_session.remove(&listener.session_id);
        }
        true
    }
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    arena: Mutex<Arena>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the listener for `session_id`, replacing any previous one.
    pub fn subscribe(
        &self,
        session_id: SessionId,
    ) -> (SubscriptionKey, mpsc::UnboundedReceiver<ServerSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut arena = self.arena.lock();

        if let Some(previous) = arena.by_session.get(&session_id).copied() {
            debug!("Replacing subscription for session {}", session_id);
            arena.remove(previous);
        }

        let listener = Listener { session_id, tx };
        let key = match arena.free.pop() {
            Some(index) => {
                let slot = &mut arena.slots[index];
                slot.listener = Some(listener);
                SubscriptionKey {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                arena.slots.push(Slot {
                    generation: 0,
                    listener: Some(listener),
                });
                SubscriptionKey {
                    index: arena.slots.len() - 1,
                    generation: 0,
                }
            }
        };
        arena.by_session.insert(session_id, key);
        (key, rx)
    }

    /// Returns false for keys that are already gone.
    pub fn unsubscribe(&self, key: SubscriptionKey) -> bool {
        self.arena.lock().remove(key)
    }

    /// Hands `signal` to the session's listener, or gives it back when nobody listens.
    pub fn dispatch(&self, session_id: SessionId, signal: ServerSignal) -> Result<(), ServerSignal> {
        let mut arena = self.arena.lock();
        let Some(key) = arena.by_session.get(&session_id).copied() else {
            return Err(signal);
        };
        let delivered = match arena.slots[key.index].listener.as_ref() {
            Some(listener) => listener.tx.send(signal),
            None => return Err(signal),
        };

        match delivered {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(signal)) => {
                // The receiver is gone without unsubscribing.
                arena.remove(key);
                Err(signal)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.arena.lock().by_session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut arena = self.arena.lock();
        let keys: Vec<SubscriptionKey> = arena.by_session.values().copied().collect();
        for key in keys {
            arena.remove(key);
        }
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    key: SubscriptionKey,
    session_id: SessionId,
    registry: Arc<SubscriptionRegistry>,
    rx: mpsc::UnboundedReceiver<ServerSignal>,
}

impl Subscription {
    pub fn new(registry: Arc<SubscriptionRegistry>, session_id: SessionId) -> Self {
        let (key, rx) = registry.subscribe(session_id);
        Self {
            key,
            session_id,
            registry,
            rx,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub async fn recv(&mut self) -> Option<ServerSignal> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.registry.unsubscribe(self.key) {
            debug!("Unsubscribed from session {}", self.session_id);
        }
    }
}
