//! # Take-by-pattern channel.
//!
//! [`PatternChannel`] does not buffer messages. Every consumer registers with a
//! [`Pattern`]; a put is delivered to **every** pending consumer whose pattern
//! matches (in registration order) and those consumers are removed. Consumers
//! that do not match stay queued for a later message.
//!
//! ## Terminal input
//! ```text
//! put(End) / error(e)
//!   ├─► consumer set swapped to empty under the lock
//!   ├─► every former consumer settled with End / Err(e) (lock released)
//!   └─► the terminal input is remembered: later takes settle with it at once,
//!       later puts are dropped
//! ```
//!
//! Patterns are evaluated while the lock is held and must not touch the channel.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex};

use super::channel::{TakeTicket, Taker};
use super::pattern::Pattern;
use crate::error::SagaError;
use crate::util::lock;
use crate::value::Value;

struct Consumer {
    id: u64,
    pattern: Pattern,
    taker: Taker,
}

#[derive(Default)]
struct PatternState {
    consumers: Vec<Consumer>,
    terminal: Option<Result<Value, SagaError>>,
    next_id: u64,
}

/// Pattern-matching consumer registry. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct PatternChannel {
    inner: Arc<Mutex<PatternState>>,
}

impl PatternChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer for the next message matching `pattern`.
    pub fn take<F>(&self, pattern: Pattern, taker: F) -> TakeTicket
    where
        F: FnOnce(Result<Value, SagaError>) + Send + 'static,
    {
        let mut st = lock(&self.inner);
        if let Some(terminal) = st.terminal.clone() {
            drop(st);
            taker(terminal);
            return TakeTicket::served();
        }

        let id = st.next_id;
        st.next_id += 1;
        st.consumers.push(Consumer {
            id,
            pattern,
            taker: Box::new(taker),
        });
        drop(st);

        let weak = Arc::downgrade(&self.inner);
        TakeTicket::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).consumers.retain(|c| c.id != id);
            }
        })
    }

    /// Delivers `message` to every matching consumer; [`Value::End`] closes the channel.
    pub fn put(&self, message: Value) {
        if message.is_end() {
            self.settle_all(Ok(Value::End));
            return;
        }

        let mut st = lock(&self.inner);
        if st.terminal.is_some() {
            return;
        }
        let (matched, kept): (Vec<Consumer>, Vec<Consumer>) = mem::take(&mut st.consumers)
            .into_iter()
            .partition(|c| c.pattern.matches(&message));
        st.consumers = kept;
        drop(st);

        for consumer in matched {
            (consumer.taker)(Ok(message.clone()));
        }
    }

    /// Closes the channel with an upstream error: every consumer is rejected with it.
    pub fn error(&self, err: SagaError) {
        self.settle_all(Err(err));
    }

    fn settle_all(&self, terminal: Result<Value, SagaError>) {
        let mut st = lock(&self.inner);
        if st.terminal.is_some() {
            return;
        }
        st.terminal = Some(terminal.clone());
        let consumers = mem::take(&mut st.consumers);
        drop(st);

        for consumer in consumers {
            (consumer.taker)(terminal.clone());
        }
    }

    /// Returns `true` once End or an error was put.
    pub fn is_closed(&self) -> bool {
        lock(&self.inner).terminal.is_some()
    }

    /// Number of consumers waiting for a match.
    pub fn pending_takers(&self) -> usize {
        lock(&self.inner).consumers.len()
    }
}

impl fmt::Debug for PatternChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = lock(&self.inner);
        f.debug_struct("PatternChannel")
            .field("takers", &st.consumers.len())
            .field("closed", &st.terminal.is_some())
            .finish()
    }
}
