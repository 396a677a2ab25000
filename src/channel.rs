use log::{debug, info, warn};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tokio::sync::mpsc;

use crate::message::TimerMessage;

/// A named, fire-and-forget broadcast bus. Every handle subscribed to a
/// channel name receives every message sent by any *other* handle on that
/// name; a sender never receives its own messages. Delivery is best-effort
/// with no acknowledgment and no ordering across different names, but
/// messages from one sender on one name arrive in send order.
#[derive(Debug, Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

#[derive(Debug)]
struct BusInner {
    supported: bool,
    next_handle_id: AtomicU64,
    channels: Mutex<HashMap<String, Vec<Subscriber>>>,
}

#[derive(Debug)]
struct Subscriber {
    handle_id: u64,
    tx: mpsc::UnboundedSender<TimerMessage>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_support(true)
    }

    /// A bus whose underlying transport is absent. Handles still open and
    /// subscribe, but nothing is ever delivered; the subsystem degrades to
    /// "disconnected forever" instead of crashing.
    pub fn unsupported() -> Self {
        Self::with_support(false)
    }

    fn with_support(supported: bool) -> Self {
        Self {
            inner: Arc::new(BusInner {
                supported,
                next_handle_id: AtomicU64::new(0),
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.inner.supported
    }

    /// Opens a handle on the named channel. Safe to call any number of times
    /// for the same name.
    pub fn open(&self, name: &str) -> BusHandle {
        let id = self.inner.next_handle_id.fetch_add(1, Ordering::Relaxed);
        if !self.inner.supported {
            warn!("[{name}] broadcast transport unavailable, messages will not be delivered");
        }
        BusHandle {
            bus: self.clone(),
            name: name.to_string(),
            id,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant on a named channel. Cloning shares the identity (and the
/// closed flag) of the handle; the last clone to drop closes it.
#[derive(Debug, Clone)]
pub struct BusHandle {
    bus: MessageBus,
    name: String,
    id: u64,
    closed: Arc<AtomicBool>,
}

impl BusHandle {
    pub fn channel_name(&self) -> &str {
        &self.name
    }

    pub fn is_supported(&self) -> bool {
        self.bus.is_supported()
    }

    /// Registers a receiver for messages from other handles on this channel.
    /// Multiple subscriptions per handle are supported; each has its own
    /// queue, so one dropped receiver never blocks delivery to the others.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TimerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.closed.load(Ordering::SeqCst) {
            warn!("[{}] subscribe after close", self.name);
            return rx;
        }
        self.bus
            .inner
            .channels
            .lock()
            .unwrap()
            .entry(self.name.clone())
            .or_default()
            .push(Subscriber {
                handle_id: self.id,
                tx,
            });
        rx
    }

    /// Best-effort send to every other subscriber of this channel. Never
    /// fails: a closed handle or an absent transport logs and no-ops, and
    /// dead subscriber entries are pruned.
    pub fn send(&self, message: &TimerMessage) {
        if self.closed.load(Ordering::SeqCst) {
            debug!("[{}] send after close ignored", self.name);
            return;
        }
        if !self.is_supported() {
            debug!("[{}] transport unavailable, dropping {message:?}", self.name);
            return;
        }
        let mut channels = self.bus.inner.channels.lock().unwrap();
        let Some(subscribers) = channels.get_mut(&self.name) else {
            return;
        };
        subscribers.retain(|sub| {
            if sub.handle_id == self.id {
                return true;
            }
            match sub.tx.send(message.clone()) {
                Ok(()) => true,
                Err(_) => {
                    info!("[{}] subscriber channel closed", self.name);
                    false
                }
            }
        });
    }

    /// Releases this handle's subscriptions. Idempotent; later sends no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut channels = self.bus.inner.channels.lock().unwrap();
        if let Some(subscribers) = channels.get_mut(&self.name) {
            subscribers.retain(|sub| sub.handle_id != self.id);
            if subscribers.is_empty() {
                channels.remove(&self.name);
            }
        }
    }
}

impl Drop for BusHandle {
    fn drop(&mut self) {
        if Arc::strong_count(&self.closed) == 1 {
            self.close();
        }
    }
}
