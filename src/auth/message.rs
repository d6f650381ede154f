//! Cross-window message channel.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A message posted to the owning window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    /// Origin of the sender, e.g. `https://api.example.com`.
    pub origin: String,
    pub data: serde_json::Value,
}

impl WindowMessage {
    pub fn new(origin: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

pub type MessageListener = Arc<dyn Fn(&WindowMessage) + Send + Sync>;

/// Source of window messages. Listeners stay registered until the returned
/// [`Subscription`] is disposed or dropped.
pub trait MessageSource: Send + Sync {
    fn subscribe(&self, listener: MessageListener) -> Subscription;
}

/// Disposer for a registration (listener, timer task, ...).
///
/// Runs its teardown exactly once: on [`Subscription::dispose`] or on drop,
/// whichever comes first.
#[must_use = "dropping a Subscription disposes it immediately"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// Disposer for a spawned task: aborts it.
    pub fn from_task(handle: tokio::task::AbortHandle) -> Self {
        Self::new(move || handle.abort())
    }

    pub fn dispose(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

/// In-process message source.
///
/// Hosts forward the platform's message events into [`MessageBus::post`].
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, MessageListener>>,
}

impl BusInner {
    fn listeners(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, MessageListener>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to every registered listener.
    pub fn post(&self, message: WindowMessage) {
        // Listeners may unsubscribe while handling, so dispatch outside the lock.
        let listeners: Vec<MessageListener> = self.inner.listeners().values().cloned().collect();
        for listener in listeners {
            listener(&message);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }
}

impl MessageSource for MessageBus {
    fn subscribe(&self, listener: MessageListener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().insert(id, listener);
        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.listeners().remove(&id);
            }
        })
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
