//! # FIFO channel.
//!
//! [`Channel`] pairs puts with takes in arrival order. At any moment at most one
//! of its two queues is non-empty: a put either serves the oldest waiting taker
//! or is queued; a take either consumes the oldest queued put or is queued.
//!
//! ## Close semantics
//! ```text
//! close() ──► closed = true
//!   ├─► pending takers (only possible with an empty put-queue) get End now
//!   ├─► queued puts stay queued and are handed out, in order, to the next takers
//!   └─► once the put-queue is drained, every take gets End, forever
//! put() after close ──► ack(false), message dropped
//! ```
//! Putting [`Value::End`] is the same as calling [`Channel::close`].
//!
//! ## Callbacks
//! Takers and put acknowledgements run **after** the internal lock is released,
//! so they may freely put to or take from the same channel.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use sagavisor::{Channel, Value};
//!
//! let chan = Channel::new();
//! chan.put(Value::from(1), |_| {});
//! chan.close();
//!
//! let got = Arc::new(Mutex::new(Vec::new()));
//! for _ in 0..2 {
//!     let sink = got.clone();
//!     chan.take(move |r| sink.lock().unwrap().push(r.unwrap()));
//! }
//! assert_eq!(*got.lock().unwrap(), vec![Value::from(1), Value::End]);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::error::SagaError;
use crate::util::lock;
use crate::value::Value;

/// Pending consumer: receives a message, End, or an upstream error. Called exactly once.
pub type Taker = Box<dyn FnOnce(Result<Value, SagaError>) + Send>;

/// Put acknowledgement: `true` once the message is handed to a taker, `false` if the channel was closed.
pub type PutAck = Box<dyn FnOnce(bool) + Send>;

/// Deregisters a pending take.
///
/// Returned by every `take`; cancelling a take that was already served is a no-op.
#[must_use = "a TakeTicket is the only way to withdraw a pending take"]
pub struct TakeTicket(Option<Box<dyn FnOnce() + Send>>);

impl TakeTicket {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Some(Box::new(f)))
    }

    /// Ticket for a take that was served synchronously.
    pub(crate) fn served() -> Self {
        Self(None)
    }

    /// Withdraws the take if it is still pending.
    pub fn cancel(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl fmt::Debug for TakeTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TakeTicket")
            .field("pending", &self.0.is_some())
            .finish()
    }
}

#[derive(Default)]
struct ChannelState {
    puts: VecDeque<(Value, PutAck)>,
    takers: VecDeque<(u64, Taker)>,
    closed: bool,
    next_id: u64,
}

/// Closeable FIFO queue. Cheap to clone; clones share the same queue.
#[derive(Clone, Default)]
pub struct Channel {
    inner: Arc<Mutex<ChannelState>>,
}

impl Channel {
    /// Creates an open, empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `message`; `ack` reports whether it was accepted.
    ///
    /// - closed → `ack(false)`, message dropped;
    /// - a taker is waiting → the oldest one receives `message`, then `ack(true)`;
    /// - otherwise `(message, ack)` is queued and `ack` fires when a taker consumes it.
    pub fn put<A>(&self, message: Value, ack: A)
    where
        A: FnOnce(bool) + Send + 'static,
    {
        if message.is_end() {
            let was_open = self.close_inner();
            ack(was_open);
            return;
        }

        let mut st = lock(&self.inner);
        if st.closed {
            drop(st);
            ack(false);
            return;
        }
        match st.takers.pop_front() {
            Some((_, taker)) => {
                drop(st);
                taker(Ok(message));
                ack(true);
            }
            None => st.puts.push_back((message, Box::new(ack))),
        }
    }

    /// Takes the next message (or End once closed and drained).
    pub fn take<F>(&self, taker: F) -> TakeTicket
    where
        F: FnOnce(Result<Value, SagaError>) + Send + 'static,
    {
        let mut st = lock(&self.inner);
        if let Some((message, ack)) = st.puts.pop_front() {
            drop(st);
            taker(Ok(message));
            ack(true);
            return TakeTicket::served();
        }
        if st.closed {
            drop(st);
            taker(Ok(Value::End));
            return TakeTicket::served();
        }

        let id = st.next_id;
        st.next_id += 1;
        st.takers.push_back((id, Box::new(taker)));
        drop(st);

        let weak: Weak<Mutex<ChannelState>> = Arc::downgrade(&self.inner);
        TakeTicket::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).takers.retain(|(tid, _)| *tid != id);
            }
        })
    }

    /// Closes the channel (same as putting [`Value::End`]).
    pub fn close(&self) {
        self.close_inner();
    }

    /// Returns `true` if the channel was open.
    fn close_inner(&self) -> bool {
        let mut st = lock(&self.inner);
        if st.closed {
            return false;
        }
        st.closed = true;
        let takers: Vec<(u64, Taker)> = st.takers.drain(..).collect();
        drop(st);

        for (_, taker) in takers {
            taker(Ok(Value::End));
        }
        true
    }

    /// Returns a message a withdrawn consumer received back to the head of the channel.
    ///
    /// The oldest waiting taker gets it; otherwise it is queued ahead of every
    /// other put, even after close. Its original acknowledgement already fired.
    pub(crate) fn requeue(&self, message: Value) {
        let mut st = lock(&self.inner);
        match st.takers.pop_front() {
            Some((_, taker)) => {
                drop(st);
                taker(Ok(message));
            }
            None => st.puts.push_front((message, Box::new(|_| {}))),
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    /// Number of queued, not yet consumed puts.
    pub fn pending_puts(&self) -> usize {
        lock(&self.inner).puts.len()
    }

    /// Number of takers waiting for a message.
    pub fn pending_takers(&self) -> usize {
        lock(&self.inner).takers.len()
    }

    /// Returns `true` if both handles refer to the same channel.
    pub fn same_channel(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = lock(&self.inner);
        f.debug_struct("Channel")
            .field("puts", &st.puts.len())
            .field("takers", &st.takers.len())
            .field("closed", &st.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn taker(log: &Log) -> impl FnOnce(Result<Value, SagaError>) + Send + 'static {
        let log = log.clone();
        move |r| log.lock().unwrap().push(format!("{:?}", r.unwrap()))
    }

    fn acker(log: &Log) -> impl FnOnce(bool) + Send + 'static {
        let log = log.clone();
        move |ok| log.lock().unwrap().push(ok.to_string())
    }

    #[test]
    fn queues_puts_then_serves_takers() {
        let chan = Channel::new();
        let actual = log();

        chan.put(1.into(), acker(&actual));
        chan.put(2.into(), acker(&actual));
        assert_eq!(chan.pending_puts(), 2);
        assert_eq!(chan.pending_takers(), 0);

        let _ = chan.take(taker(&actual));
        let _ = chan.take(taker(&actual));
        assert_eq!(*actual.lock().unwrap(), vec!["1", "true", "2", "true"]);
        assert_eq!(chan.pending_puts(), 0);
        assert_eq!(chan.pending_takers(), 0);

        let _ = chan.take(taker(&actual));
        let _ = chan.take(taker(&actual));
        assert_eq!(actual.lock().unwrap().len(), 4);
        assert_eq!(chan.pending_takers(), 2);

        chan.put(3.into(), acker(&actual));
        assert_eq!(
            *actual.lock().unwrap(),
            vec!["1", "true", "2", "true", "3", "true"]
        );
        assert_eq!(chan.pending_takers(), 1);
    }

    #[test]
    fn fifo_pairing_with_interleaving() {
        let chan = Channel::new();
        let actual = log();

        let _ = chan.take(taker(&actual));
        chan.put(10.into(), |_| {});
        chan.put(20.into(), |_| {});
        let _ = chan.take(taker(&actual));
        let _ = chan.take(taker(&actual));
        chan.put(30.into(), |_| {});

        assert_eq!(*actual.lock().unwrap(), vec!["10", "20", "30"]);
    }

    #[test]
    fn end_to_end_put_three_take_four() {
        let chan = Channel::new();
        let actual = log();
        for n in 1..=3 {
            chan.put(n.into(), |_| {});
        }
        let _ = chan.take(taker(&actual));
        let _ = chan.take(taker(&actual));
        assert_eq!(*actual.lock().unwrap(), vec!["1", "2"]);

        let _ = chan.take(taker(&actual));
        assert_eq!(*actual.lock().unwrap(), vec!["1", "2", "3"]);

        chan.close();
        let _ = chan.take(taker(&actual));
        assert_eq!(*actual.lock().unwrap(), vec!["1", "2", "3", "End"]);
    }

    #[test]
    fn close_flushes_queued_puts_before_end() {
        let chan = Channel::new();
        let actual = log();
        chan.put("a".into(), |_| {});
        chan.put("b".into(), |_| {});
        chan.close();

        for _ in 0..4 {
            let _ = chan.take(taker(&actual));
        }
        assert_eq!(
            *actual.lock().unwrap(),
            vec!["\"a\"", "\"b\"", "End", "End"]
        );
    }

    #[test]
    fn close_releases_waiting_takers_and_rejects_puts() {
        let chan = Channel::new();
        let actual = log();
        let _ = chan.take(taker(&actual));
        let _ = chan.take(taker(&actual));

        chan.put(Value::End, acker(&actual));
        assert!(chan.is_closed());
        chan.put(5.into(), acker(&actual));

        assert_eq!(*actual.lock().unwrap(), vec!["End", "End", "true", "false"]);
    }

    #[test]
    fn cancelled_ticket_is_skipped() {
        let chan = Channel::new();
        let actual = log();
        let first = chan.take(taker(&actual));
        let _second = chan.take(taker(&actual));
        first.cancel();
        assert_eq!(chan.pending_takers(), 1);

        chan.put(7.into(), |_| {});
        assert_eq!(*actual.lock().unwrap(), vec!["7"]);
    }

    #[test]
    fn taker_may_reenter_channel() {
        let chan = Channel::new();
        let actual = log();
        let (c2, a2) = (chan.clone(), actual.clone());
        let _ = chan.take(move |r| {
            a2.lock().unwrap().push(format!("{:?}", r.unwrap()));
            c2.put(2.into(), |_| {});
        });
        chan.put(1.into(), |_| {});
        let _ = chan.take(taker(&actual));
        assert_eq!(*actual.lock().unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn requeued_message_goes_first() {
        let chan = Channel::new();
        let actual = log();
        chan.put(Value::from(2), |_| {});
        chan.requeue(Value::from(1));
        chan.close();
        for _ in 0..3 {
            let _ = chan.take(taker(&actual));
        }
        assert_eq!(*actual.lock().unwrap(), vec!["1", "2", "End"]);

        let waiting = Channel::new();
        let actual = log();
        let _ = waiting.take(taker(&actual));
        waiting.requeue(Value::from(7));
        assert_eq!(*actual.lock().unwrap(), vec!["7"]);
        assert_eq!(waiting.pending_puts(), 0);
    }
}
