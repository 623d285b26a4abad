//! # Task handles and outcomes.
//!
//! A [`TaskHandle`] is the outside view of one task in the tree. The driver owns
//! the task itself; the handle only shares:
//! - the task's id and name;
//! - its [`TaskState`], updated by the driver;
//! - its [`Outcome`], published once through a `tokio::sync::watch` channel;
//! - the driver mailbox, so [`TaskHandle::cancel`] can be called from anywhere.
//!
//! ```text
//! Running ──► Suspended ──► Running ──► ... ──► Done | Cancelled | Errored
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};

use super::mailbox::Signal;
use crate::error::SagaError;
use crate::util::lock;
use crate::value::Value;

static TASK_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique task id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(TASK_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// The routine is being polled.
    Running,
    /// Waiting on an effect, a foreign future, or forked children.
    Suspended,
    Done,
    Cancelled,
    Errored,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Cancelled | TaskState::Errored)
    }
}

/// How a task settled.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Done(Value),
    Cancelled,
    Failed(SagaError),
}

impl Outcome {
    pub fn state(&self) -> TaskState {
        match self {
            Outcome::Done(_) => TaskState::Done,
            Outcome::Cancelled => TaskState::Cancelled,
            Outcome::Failed(_) => TaskState::Errored,
        }
    }

    /// Result a joiner resumes with: cancellation is a value, not an error.
    pub fn into_joined(self) -> Result<Value, SagaError> {
        match self {
            Outcome::Done(v) => Ok(v),
            Outcome::Cancelled => Ok(Value::Cancelled),
            Outcome::Failed(e) => Err(e),
        }
    }

    /// Result a caller resumes with: a cancelled callee rejects the caller.
    pub(crate) fn into_called(self) -> Result<Value, SagaError> {
        match self {
            Outcome::Done(v) => Ok(v),
            Outcome::Cancelled => Err(SagaError::Cancelled),
            Outcome::Failed(e) => Err(e),
        }
    }

    /// Converts to a plain `Result`, treating cancellation as an error.
    pub fn into_result(self) -> Result<Value, SagaError> {
        self.into_called()
    }
}

struct Shared {
    id: TaskId,
    name: Arc<str>,
    state: Mutex<TaskState>,
    outcome: watch::Sender<Option<Outcome>>,
    mailbox: mpsc::UnboundedSender<Signal>,
}

/// Handle to a task. Cheap to clone; equality is by task id.
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<Shared>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, name: Arc<str>, mailbox: mpsc::UnboundedSender<Signal>) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                id,
                name,
                state: Mutex::new(TaskState::Running),
                outcome,
                mailbox,
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.shared.name)
    }

    pub fn state(&self) -> TaskState {
        *lock(&self.shared.state)
    }

    /// `true` until the task settles.
    pub fn is_running(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Outcome snapshot; `None` while the task is live.
    pub fn outcome(&self) -> Option<Outcome> {
        self.shared.outcome.borrow().clone()
    }

    /// Requests cancellation of this task and its descendants.
    ///
    /// No-op once the task settled or its runtime is gone.
    pub fn cancel(&self) {
        if self.is_running() {
            let _ = self.shared.mailbox.send(Signal::Cancel(self.shared.id));
        }
    }

    /// Waits until the task settles (including all forked descendants).
    pub async fn done(&self) -> Outcome {
        let mut rx = self.shared.outcome.subscribe();
        let seen = match rx.wait_for(Option::is_some).await {
            Ok(seen) => seen.clone(),
            // unreachable while `self` holds the sender
            Err(_) => return Outcome::Failed(SagaError::misuse("task outcome channel closed")),
        };
        seen.unwrap_or(Outcome::Cancelled)
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        *lock(&self.shared.state) = state;
    }

    /// Publishes the final outcome. Later calls are ignored.
    pub(crate) fn settle(&self, outcome: Outcome) {
        if self.shared.outcome.borrow().is_some() {
            return;
        }
        self.set_state(outcome.state());
        self.shared.outcome.send_replace(Some(outcome));
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TaskHandle {}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (TaskHandle, mpsc::UnboundedReceiver<Signal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TaskHandle::new(TaskId::next(), "worker".into(), tx), rx)
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(TaskId::next(), TaskId::next());
    }

    #[tokio::test]
    async fn done_resolves_with_first_outcome() {
        let (h, _rx) = handle();
        assert!(h.is_running());
        assert_eq!(h.outcome(), None);

        let waiter = {
            let h = h.clone();
            tokio::spawn(async move { h.done().await })
        };
        h.settle(Outcome::Done(Value::from(1)));
        h.settle(Outcome::Cancelled);

        assert_eq!(waiter.await.unwrap(), Outcome::Done(Value::from(1)));
        assert_eq!(h.state(), TaskState::Done);
        assert_eq!(h.outcome(), Some(Outcome::Done(Value::from(1))));
    }

    #[test]
    fn cancel_posts_signal_only_while_running() {
        let (h, mut rx) = handle();
        h.cancel();
        assert!(matches!(rx.try_recv(), Ok(Signal::Cancel(id)) if id == h.id()));

        h.settle(Outcome::Cancelled);
        h.cancel();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn joined_and_called_views_of_cancellation_differ() {
        assert_eq!(Outcome::Cancelled.into_joined(), Ok(Value::Cancelled));
        assert_eq!(Outcome::Cancelled.into_called(), Err(SagaError::Cancelled));
    }
}
