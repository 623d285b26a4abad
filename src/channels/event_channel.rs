//! # Event channel: external push source → take-by-pattern interface.
//!
//! [`EventChannel`] subscribes to a [`Source`] once and forwards everything the
//! source produces through [`PatternChannel`] delivery:
//!
//! ```text
//! Source ── listener(Ok(msg)) ──► PatternChannel::put(msg) ──► matching takers
//!        ── listener(Ok(End)) ──► every taker gets End (and every later take)
//!        ── listener(Err(e))  ──► every taker rejected with e
//! ```
//!
//! Messages that arrive while no consumer matches are **dropped**: a push-only
//! source has no notion of catching up.
//!
//! [`EventChannel::unsubscribe`] detaches from the source and nothing more;
//! [`EventChannel::close`] detaches and also settles pending takers with End.

use std::fmt;
use std::sync::{Arc, Mutex};

use super::channel::TakeTicket;
use super::emitter::{Emitter, Unsubscribe};
use super::pattern::Pattern;
use super::pattern_channel::PatternChannel;
use crate::error::SagaError;
use crate::util::lock;
use crate::value::Value;

/// Callback a [`Source`] pushes its messages into.
pub type Listener = Arc<dyn Fn(Result<Value, SagaError>) + Send + Sync>;

/// External push source of messages.
///
/// Contract: a source may eventually deliver `Ok(Value::End)` (or an `Err`) and
/// must not call the listener re-entrantly from within a listener call.
pub trait Source: Send + Sync {
    /// Starts delivering messages to `listener`.
    fn subscribe(&self, listener: Listener) -> Unsubscribe;
}

impl Source for Emitter<Value> {
    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        Emitter::subscribe(self, move |v: &Value| listener(Ok(v.clone())))
    }
}

impl<S: Source + ?Sized> Source for Arc<S> {
    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        (**self).subscribe(listener)
    }
}

/// Closure-backed [`Source`].
///
/// ```rust
/// use sagavisor::{source_fn, EventChannel, Unsubscribe, Value};
///
/// let ticks = source_fn(|listener| {
///     listener(Ok(Value::from(3)));
///     Unsubscribe::noop()
/// });
/// let chan = EventChannel::new(&ticks);
/// assert_eq!(chan.pending_takers(), 0);
/// ```
pub struct FnSource<F>(F);

/// Wraps `f` as a [`Source`].
pub fn source_fn<F>(f: F) -> FnSource<F>
where
    F: Fn(Listener) -> Unsubscribe + Send + Sync,
{
    FnSource(f)
}

impl<F> Source for FnSource<F>
where
    F: Fn(Listener) -> Unsubscribe + Send + Sync,
{
    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        (self.0)(listener)
    }
}

/// Pattern channel fed by an external [`Source`]. Cheap to clone.
#[derive(Clone)]
pub struct EventChannel {
    chan: PatternChannel,
    unsubscribe: Arc<Mutex<Option<Unsubscribe>>>,
}

impl EventChannel {
    /// Subscribes to `source` and returns the channel it feeds.
    pub fn new<S: Source + ?Sized>(source: &S) -> Self {
        let chan = PatternChannel::new();
        let sink = chan.clone();
        let unsub = source.subscribe(Arc::new(move |input: Result<Value, SagaError>| match input {
            Ok(message) => sink.put(message),
            Err(err) => sink.error(err),
        }));
        Self {
            chan,
            unsubscribe: Arc::new(Mutex::new(Some(unsub))),
        }
    }

    /// Registers a consumer for the next message matching `pattern`.
    pub fn take<F>(&self, pattern: Pattern, taker: F) -> TakeTicket
    where
        F: FnOnce(Result<Value, SagaError>) + Send + 'static,
    {
        self.chan.take(pattern, taker)
    }

    /// Detaches from the source. Idempotent.
    pub fn unsubscribe(&self) {
        let unsub = lock(&self.unsubscribe).take();
        if let Some(unsub) = unsub {
            unsub.unsubscribe();
        }
    }

    /// Detaches from the source and settles every pending consumer with End.
    pub fn close(&self) {
        self.unsubscribe();
        self.chan.put(Value::End);
    }

    /// Returns `true` once the source delivered End or an error (or after [`close`](Self::close)).
    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    /// Number of consumers waiting for a match.
    pub fn pending_takers(&self) -> usize {
        self.chan.pending_takers()
    }

    /// Returns `true` if both handles refer to the same channel.
    pub fn same_channel(&self, other: &EventChannel) -> bool {
        Arc::ptr_eq(&self.unsubscribe, &other.unsubscribe)
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("chan", &self.chan)
            .field("subscribed", &lock(&self.unsubscribe).is_some())
            .finish()
    }
}
