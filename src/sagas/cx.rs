//! # Routine context.
//!
//! Every routine receives a [`Cx`]. It is the routine's only way to talk to the
//! runtime: [`Cx::run`] yields one [`Effect`] and resolves with the value the
//! runtime resumes it with.
//!
//! ## Yield protocol
//! ```text
//! routine: cx.run(effect).await
//!   first poll  ──► effect parked in the task slot ──► Pending
//! driver:     takes the effect from the slot, interprets it
//!   settle    ──► resume value stored in the slot ──► driver polls the routine again
//!   next poll ──► EffectFuture takes the resume value ──► Ready
//! ```
//!
//! Only the driver polls a routine, so a parked effect is never observed by two
//! pollers. A routine that yields while another effect is still outstanding
//! (e.g. by polling two `EffectFuture`s in a `join!`) gets [`SagaError::Misuse`].
//!
//! While an effect is outstanding the driver ignores wake-ups from anything
//! else, so a routine that polls an effect alongside a foreign future (e.g. in
//! `tokio::select!`) is only polled again when the effect settles. Use
//! [`Cx::race`] with a `call` effect to wait on both. Dropping an unfinished
//! `EffectFuture` leaves its effect outstanding, so the next yield also gets
//! [`SagaError::Misuse`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use crate::channels::{Channel, EventChannel, Pattern};
use crate::core::{TaskHandle, TaskId};
use crate::effects::{Effect, Effects};
use crate::error::SagaError;
use crate::sagas::saga::SagaRef;
use crate::util::lock;
use crate::value::Value;

/// Hand-off point between one routine and the driver.
#[derive(Default)]
pub(crate) struct Slot {
    /// Effect yielded by the routine, not yet picked up by the driver.
    pub(crate) yielded: Option<Effect>,
    /// Result the driver resumes the routine with.
    pub(crate) resume: Option<Result<Value, SagaError>>,
    /// An `EffectFuture` is waiting for `resume`.
    pub(crate) outstanding: bool,
}

pub(crate) type SharedSlot = Arc<Mutex<Slot>>;

/// Explicit context of one running task. Cheap to clone.
#[derive(Clone)]
pub struct Cx {
    task: TaskId,
    name: Arc<str>,
    slot: SharedSlot,
}

impl Cx {
    pub(crate) fn new(task: TaskId, name: Arc<str>, slot: SharedSlot) -> Self {
        Self { task, name, slot }
    }

    /// Id of the task this routine runs in.
    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// Name of the task this routine runs in.
    pub fn task_name(&self) -> &str {
        &self.name
    }

    /// Yields `effect` and waits for the runtime to resume the routine.
    pub fn run(&self, effect: Effect) -> EffectFuture {
        EffectFuture {
            slot: Arc::clone(&self.slot),
            effect: Some(effect),
            state: Stage::Start,
        }
    }

    /// Next message matching `pattern` on the default channel ([`Value::End`] once closed).
    pub async fn take(&self, pattern: impl Into<Pattern>) -> Result<Value, SagaError> {
        self.run(Effect::take(pattern)).await
    }

    /// Next message on a FIFO channel ([`Value::End`] once closed and drained).
    pub async fn take_from(&self, chan: &Channel) -> Result<Value, SagaError> {
        self.run(Effect::take_from(chan)).await
    }

    /// Next message matching `pattern` on an event channel.
    pub async fn take_events(
        &self,
        chan: &EventChannel,
        pattern: impl Into<Pattern>,
    ) -> Result<Value, SagaError> {
        self.run(Effect::take_events(chan, pattern)).await
    }

    /// Dispatches `message` through the runtime's dispatch sink.
    pub async fn put(&self, message: impl Into<Value>) -> Result<(), SagaError> {
        self.run(Effect::put(message)).await.map(drop)
    }

    /// Puts `message` on `chan` without waiting for a taker.
    pub async fn put_to(&self, chan: &Channel, message: impl Into<Value>) -> Result<(), SagaError> {
        self.run(Effect::put_to(chan, message)).await.map(drop)
    }

    /// Puts `message` on `chan`; resolves once it is consumed (`true`) or rejected (`false`).
    pub async fn put_and_wait(
        &self,
        chan: &Channel,
        message: impl Into<Value>,
    ) -> Result<bool, SagaError> {
        let v = self.run(Effect::put_and_wait(chan, message)).await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    /// Runs `saga` as a child task and returns its value.
    pub async fn call(&self, saga: &SagaRef, args: Vec<Value>) -> Result<Value, SagaError> {
        self.run(Effect::call(saga, args)).await
    }

    /// Starts `saga` as a child task.
    pub async fn fork(&self, saga: &SagaRef, args: Vec<Value>) -> Result<TaskHandle, SagaError> {
        match self.run(Effect::fork(saga, args)).await? {
            Value::Task(handle) => Ok(handle),
            other => Err(SagaError::misuse(format!(
                "fork resumed with {other:?} instead of a task"
            ))),
        }
    }

    /// Waits for `task`; [`Value::Cancelled`] if it was cancelled.
    pub async fn join(&self, task: &TaskHandle) -> Result<Value, SagaError> {
        self.run(Effect::join(task)).await
    }

    /// Cancels `task` and its descendants.
    pub async fn cancel(&self, task: &TaskHandle) -> Result<(), SagaError> {
        self.run(Effect::cancel(task)).await.map(drop)
    }

    /// Cancels the current task. Resolves with [`SagaError::Cancelled`].
    pub async fn cancel_self(&self) -> Result<(), SagaError> {
        self.run(Effect::cancel_self()).await.map(drop)
    }

    /// First effect to settle wins; the others are cancelled.
    pub async fn race(&self, effects: impl Into<Effects>) -> Result<Value, SagaError> {
        self.run(Effect::race(effects)).await
    }

    /// Waits for every effect; the first error cancels the rest.
    pub async fn all(&self, effects: impl Into<Effects>) -> Result<Value, SagaError> {
        self.run(Effect::all(effects)).await
    }

    /// Applies `selector` to the runtime's current state.
    pub async fn select<F>(&self, selector: F) -> Result<Value, SagaError>
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.run(Effect::select(selector)).await
    }

    /// `true` while the routine runs its cancellation cleanup.
    pub async fn cancelled(&self) -> Result<bool, SagaError> {
        let v = self.run(Effect::cancelled()).await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    /// Suspends for `d`.
    pub async fn delay(&self, d: Duration) -> Result<(), SagaError> {
        self.run(Effect::delay(d)).await.map(drop)
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("task", &self.task)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Start,
    Waiting,
    Done,
}

/// Future returned by [`Cx::run`].
#[must_use = "effects do nothing unless awaited"]
pub struct EffectFuture {
    slot: SharedSlot,
    effect: Option<Effect>,
    state: Stage,
}

impl Future for EffectFuture {
    type Output = Result<Value, SagaError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.state {
            Stage::Start => {
                let mut slot = lock(&this.slot);
                if slot.outstanding {
                    this.state = Stage::Done;
                    return Poll::Ready(Err(SagaError::misuse(
                        "effect yielded while another effect is outstanding",
                    )));
                }
                slot.outstanding = true;
                slot.yielded = this.effect.take();
                this.state = Stage::Waiting;
                Poll::Pending
            }
            Stage::Waiting => {
                let mut slot = lock(&this.slot);
                match slot.resume.take() {
                    Some(result) => {
                        slot.outstanding = false;
                        this.state = Stage::Done;
                        Poll::Ready(result)
                    }
                    None => Poll::Pending,
                }
            }
            Stage::Done => Poll::Ready(Err(SagaError::misuse("effect polled after completion"))),
        }
    }
}

impl fmt::Debug for EffectFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectFuture")
            .field("state", &self.state)
            .finish()
    }
}
