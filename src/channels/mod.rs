//! Channels: where routines wait for messages.
//!
//! ## Contents
//! - [`Pattern`] consumer-side filter (wildcard / tag / tag set / predicate)
//! - [`Emitter`] synchronous broadcaster, usable as a [`Source`]
//! - [`Channel`] closeable FIFO queue pairing puts with takes
//! - [`PatternChannel`] unbuffered take-by-pattern delivery
//! - [`EventChannel`] a [`PatternChannel`] fed by an external [`Source`]
//!
//! ## Quick reference
//! ```text
//!                 put ──►  Channel  ──► take        (buffered, FIFO, close flushes)
//! Source ── listener ──► EventChannel ──► take(P)   (lossy, pattern-matched)
//! ```
//! All takes return a [`TakeTicket`]; the runtime keeps it to withdraw the take
//! when the waiting task is cancelled.

mod channel;
mod emitter;
mod event_channel;
mod pattern;
mod pattern_channel;

pub use channel::{Channel, PutAck, TakeTicket, Taker};
pub use emitter::{Emitter, Unsubscribe};
pub use event_channel::{source_fn, EventChannel, FnSource, Listener, Source};
pub use pattern::{Matcher, Pattern};
pub use pattern_channel::PatternChannel;
