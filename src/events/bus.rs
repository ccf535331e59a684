//! # Event bus for lifecycle and diagnostic events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so that workers, registries, membership
//! adapters and the sink connector can publish without ever waiting on observers.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                  Listener (one):
//!   Worker 1   ──┐
//!   Worker N   ──┤
//!   Registry   ──┼─────► Bus ───────► subscriber_listener ────► SubscriberSet
//!   Adapter    ──┤  (broadcast chan)     (in Supervisor)
//!   Connector  ──┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is discarded.
//! - One shared ring buffer; a receiver that falls behind sees `RecvError::Lagged(n)`.
//! - Events are diagnostics only. Log lines never travel over the bus.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone; every clone publishes into the same ring buffer.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus whose ring buffer holds `capacity` events (min 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every current receiver.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver for events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
