//! Driver mailbox.
//!
//! Everything that happens outside the driver loop (channel deliveries, put
//! acknowledgements, foreign wakers, `TaskHandle::cancel`) reaches the task tree
//! as a [`Signal`] on one unbounded mpsc queue. The driver applies signals in
//! arrival order, which makes settlement order deterministic.

use std::mem;
use std::sync::{Arc, Mutex};

use futures::task::ArcWake;
use tokio::sync::mpsc;

use super::handle::TaskId;
use crate::channels::Channel;
use crate::error::SagaError;
use crate::util::lock;
use crate::value::Value;

/// Per-runtime effect id.
pub(crate) type EffectId = u64;

#[derive(Debug)]
pub(crate) enum Signal {
    /// An asynchronous effect settled.
    Settle {
        effect: EffectId,
        result: Result<Value, SagaError>,
        /// FIFO channel the message was taken from; it gets the message back
        /// if the effect was withdrawn in the meantime.
        origin: Option<Channel>,
    },
    /// A foreign future inside the task's routine is ready to make progress.
    Wake(TaskId),
    /// Cancel the task and its descendants.
    Cancel(TaskId),
}

pub(crate) type Mailbox = mpsc::UnboundedSender<Signal>;

/// Builds the callback an asynchronous effect settles through.
pub(crate) fn settler(
    mailbox: &Mailbox,
    effect: EffectId,
) -> impl FnOnce(Result<Value, SagaError>) + Send + 'static {
    let mailbox = mailbox.clone();
    move |result| {
        let _ = mailbox.send(Signal::Settle {
            effect,
            result,
            origin: None,
        });
    }
}

enum InlineState {
    Armed,
    Ready(Result<Value, SagaError>),
    Detached,
}

/// Captures a settlement that happens while the effect is still being started.
///
/// A channel serves a take (or acknowledges a put) synchronously when it can.
/// Such results are settled inline by the driver instead of going through the
/// mailbox, so a race whose first branch is ready never starts the others.
pub(crate) struct InlineCell(Arc<Mutex<InlineState>>);

impl InlineCell {
    pub(crate) fn new() -> Self {
        InlineCell(Arc::new(Mutex::new(InlineState::Armed)))
    }

    /// Callback that fills the cell until [`detach`](Self::detach), then posts to the mailbox.
    pub(crate) fn settler(
        &self,
        mailbox: &Mailbox,
        effect: EffectId,
        origin: Option<Channel>,
    ) -> impl FnOnce(Result<Value, SagaError>) + Send + 'static {
        let cell = Arc::clone(&self.0);
        let mailbox = mailbox.clone();
        move |result| {
            let mut st = lock(&cell);
            if matches!(*st, InlineState::Armed) {
                *st = InlineState::Ready(result);
                return;
            }
            drop(st);
            let _ = mailbox.send(Signal::Settle {
                effect,
                result,
                origin,
            });
        }
    }

    /// `Some(is_ok)` once a result was captured, `None` while still waiting.
    pub(crate) fn settled_ok(&self) -> Option<bool> {
        match &*lock(&self.0) {
            InlineState::Ready(result) => Some(result.is_ok()),
            _ => None,
        }
    }

    /// Stops capturing; returns the result if one arrived while armed.
    pub(crate) fn detach(self) -> Option<Result<Value, SagaError>> {
        match mem::replace(&mut *lock(&self.0), InlineState::Detached) {
            InlineState::Ready(result) => Some(result),
            _ => None,
        }
    }
}

/// Waker handed to routines: waking posts [`Signal::Wake`].
pub(crate) struct TaskWaker {
    pub(crate) task: TaskId,
    pub(crate) mailbox: Mailbox,
}

impl TaskWaker {
    pub(crate) fn waker(task: TaskId, mailbox: &Mailbox) -> std::task::Waker {
        futures::task::waker(Arc::new(TaskWaker {
            task,
            mailbox: mailbox.clone(),
        }))
    }
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let _ = arc_self.mailbox.send(Signal::Wake(arc_self.task));
    }
}
