use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::job::JobEvent;

/// Subscription key that matches every job.
pub const ALL_JOBS: &str = "all";

pub type ListenerId = u64;

type Listeners = HashMap<String, Vec<(ListenerId, mpsc::Sender<JobEvent>)>>;

/// Table of event listeners keyed by job id (or [`ALL_JOBS`]).
///
/// Each listener owns a bounded channel. Dispatch never waits on a listener:
/// an event for a full channel is dropped for that listener only.
#[derive(Debug)]
pub struct ListenerRegistry {
    listeners: Mutex<Listeners>,
    next_id: AtomicU64,
    buffer: usize,
}

impl ListenerRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    // Dispatch and removal never panic while holding the lock, so a poisoned
    // map is still structurally sound.
    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new listener under `key`.
    pub fn add_listener(self: &Arc<Self>, key: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.lock().entry(key.to_string()).or_default().push((id, tx));
        tracing::debug!(key, listener_id = id, "Listener added");

        Subscription {
            key: key.to_string(),
            id,
            rx,
            registry: Arc::clone(self),
            removed: false,
        }
    }

    /// Unregister one listener. Dropping its sender closes the channel, so a
    /// consumer blocked in `recv` wakes up with `None`. Returns false if the
    /// listener was already gone.
    pub fn remove_listener(&self, key: &str, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let Some(entries) = listeners.get_mut(key) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(listener_id, _)| *listener_id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(key);
        }

        if removed {
            tracing::debug!(key, listener_id = id, "Listener removed");
        }
        removed
    }

    /// Deliver `event` to every listener of its job and every [`ALL_JOBS`] listener.
    pub fn dispatch(&self, event: &JobEvent) {
        let mut listeners = self.lock();
        for key in [event.job_id.as_str(), ALL_JOBS] {
            let Some(entries) = listeners.get_mut(key) else {
                continue;
            };

            entries.retain(|(id, tx)| match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        key,
                        listener_id = *id,
                        job_id = %event.job_id,
                        "Listener buffer full, dropping event"
                    );
                    true
                }
                // Receiver dropped without removing itself
                Err(TrySendError::Closed(_)) => false,
            });

            if entries.is_empty() {
                listeners.remove(key);
            }
        }
    }

    /// Remove every listener, ending all consumers once their buffers drain.
    pub fn close_all(&self) {
        let removed: usize = {
            let mut listeners = self.lock();
            let count = listeners.values().map(Vec::len).sum();
            listeners.clear();
            count
        };
        tracing::info!(listeners = removed, "Closed all event listeners");
    }

    /// Total number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    pub fn listener_count_for(&self, key: &str) -> usize {
        self.lock().get(key).map_or(0, Vec::len)
    }
}

/// A registered listener. Removes itself from the registry on drop.
#[derive(Debug)]
pub struct Subscription {
    key: String,
    id: ListenerId,
    rx: mpsc::Receiver<JobEvent>,
    registry: Arc<ListenerRegistry>,
    removed: bool,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Next event, or `None` once the listener has been removed.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.rx.recv().await
    }

    /// Remove this listener. Events already buffered can still be received.
    pub fn unsubscribe(&mut self) {
        if !self.removed {
            self.removed = true;
            self.registry.remove_listener(&self.key, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
