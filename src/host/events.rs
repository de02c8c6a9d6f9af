//! Host event bus
//!
//! Events are fanned out over a `tokio::sync::broadcast` channel. A listener
//! is registered by [`EventBus::listen`] and deregistered by dropping the
//! returned [`EventListener`]; events emitted while no listener exists are
//! lost.

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::model::{EventKind, HostEvent};

const DEFAULT_CAPACITY: usize = 64;

/// Broadcast bus carrying [`HostEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HostEvent>,
}

impl EventBus {
    /// Creates a bus with the default buffer size
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus buffering up to `capacity` undelivered events per listener
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Dispatches an event; returns how many listeners received it
    pub fn emit(&self, event: HostEvent) -> usize {
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(count) => {
                debug!("Dispatched {} to {} listener(s)", kind, count);
                count
            }
            Err(_) => {
                debug!("Dispatched {} with no listeners", kind);
                0
            }
        }
    }

    /// Registers a listener for `kind`, optionally restricted to one origin
    pub fn listen(&self, kind: EventKind, origin: Option<&str>) -> EventListener {
        EventListener {
            kind,
            origin: origin.map(str::to_string),
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered listener; dropping it removes the registration
#[derive(Debug)]
pub struct EventListener {
    kind:     EventKind,
    origin:   Option<String>,
    receiver: broadcast::Receiver<HostEvent>,
}

impl EventListener {
    /// Kind this listener accepts
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Waits for the next matching event; `None` once the bus is gone
    pub async fn next(&mut self) -> Option<HostEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Listener for {} lagged, {} event(s) dropped", self.kind, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn accepts(&self, event: &HostEvent) -> bool {
        event.kind() == self.kind
            && self
                .origin
                .as_deref()
                .map(|origin| event.origin() == origin)
                .unwrap_or(true)
    }
}
