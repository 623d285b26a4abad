//! # Event bus for broadcasting monitor events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from the runtime driver and the subscriber
//! workers.
//!
//! ## Architecture
//! ```text
//! Publishers:                        Subscribers (any number):
//!   Driver (task tree) ──┐
//!                        ├──► Bus ──► Runtime listener ──► SubscriberSet
//!   SubscriberSet ───────┘       └──► Runtime::bus().subscribe() (tests, tools)
//! ```
//!
//! One bus serves every task tree started by a [`Runtime`](crate::Runtime):
//! events of concurrent roots interleave and are told apart by `task_id`.
//! Sending never blocks the driver. A receiver that falls more than the bus
//! capacity behind gets `RecvError::Lagged(n)`; events published while nobody
//! listens are gone.

use tokio::sync::broadcast;

use super::event::Event;

/// Monitor event broadcaster shared by the runtime's drivers. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers; dropped when there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
