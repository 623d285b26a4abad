//! Monitor events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the runtime driver and subscriber
//! workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the driver of each root task (task and effect lifecycle),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the runtime's subscriber listener (fans out to
//!   `SubscriberSet`), and anyone holding `Runtime::bus()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
