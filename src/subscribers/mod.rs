//! # Event subscribers for the sagavisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and built-in implementations for monitor events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Driver ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                         │
//!                                              ┌──────────┼──────────┐
//!                                              ▼          ▼          ▼
//!                                          LogWriter   Metrics     Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub(crate) use subscriber_set::panic_message;
pub use subscriber_set::SubscriberSet;
