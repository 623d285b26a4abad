//! # Effect descriptors.
//!
//! An [`Effect`] is an inert description of something a routine wants done.
//! Building one has no side effects; the runtime interprets it when the
//! routine yields it through [`Cx::run`](crate::Cx::run).
//!
//! ## Suspension
//! ```text
//! suspends:       Take, Call, Join, Race, All, Put{wait: true}
//! never suspends: Put{wait: false}, Fork, Cancel, Select, Cancelled
//! ```
//!
//! ## Resume values
//! | Effect | Resumes with |
//! |---|---|
//! | `Take` | the message, or [`Value::End`] |
//! | `Put` | `Unit` (or `Bool(accepted)` when waiting) |
//! | `Call` | the child's value; its error is raised in the caller |
//! | `Fork` | [`Value::Task`] handle of the child |
//! | `Join` | the task's value, [`Value::Cancelled`], or its error |
//! | `Cancel` | `Unit` |
//! | `Race` | winner only: `Map{key: v}` or `List` with `Unit` for losers |
//! | `All` | every result in the given shape |
//! | `Select` | the selector's output |
//! | `Cancelled` | `Bool` |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::channels::{Channel, EventChannel, Pattern};
use crate::core::TaskHandle;
use crate::sagas::{SagaFn, SagaRef};
use crate::value::Value;

/// Reads the external state for [`Effect::Select`].
pub type Selector = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Where a [`Effect::Take`] waits.
#[derive(Clone)]
pub enum TakeFrom {
    /// The runtime's default channel (fed by its [`Source`](crate::Source)).
    Default(Pattern),
    /// A user-created [`EventChannel`].
    Events(EventChannel, Pattern),
    /// A FIFO [`Channel`].
    Channel(Channel),
}

/// Where a [`Effect::Put`] goes.
#[derive(Clone, Debug)]
pub enum PutTo {
    /// The runtime's `dispatch` sink.
    Dispatch,
    Channel(Channel),
}

/// Effect set for [`Effect::Race`] and [`Effect::All`].
///
/// `Keyed` keeps insertion order, which is also evaluation order.
pub enum Effects {
    List(Vec<Effect>),
    Keyed(Vec<(Arc<str>, Effect)>),
}

impl Effects {
    /// Builds a keyed set from `(name, effect)` pairs.
    pub fn keyed<K, I>(entries: I) -> Self
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, Effect)>,
    {
        Effects::Keyed(entries.into_iter().map(|(k, e)| (k.into(), e)).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Effects::List(v) => v.len(),
            Effects::Keyed(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits into (keys, effects); keys are `None` for a list.
    pub(crate) fn split(self) -> (Option<Vec<Arc<str>>>, Vec<Effect>) {
        match self {
            Effects::List(v) => (None, v),
            Effects::Keyed(v) => {
                let (keys, effects) = v.into_iter().unzip();
                (Some(keys), effects)
            }
        }
    }
}

impl From<Vec<Effect>> for Effects {
    fn from(v: Vec<Effect>) -> Self {
        Effects::List(v)
    }
}

/// Declarative description of an asynchronous action.
pub enum Effect {
    Take(TakeFrom),
    Put {
        to: PutTo,
        message: Value,
        /// Suspend until the message is consumed (channels) or dispatched.
        wait: bool,
    },
    /// Run a child task and wait for it.
    Call { saga: SagaRef, args: Vec<Value> },
    /// Start a child task and continue.
    Fork { saga: SagaRef, args: Vec<Value> },
    Join(TaskHandle),
    /// Cancel a task; `None` cancels the current one.
    Cancel(Option<TaskHandle>),
    Race(Effects),
    All(Effects),
    Select(Selector),
    Cancelled,
}

impl Effect {
    /// Takes the next message matching `pattern` from the default channel.
    pub fn take(pattern: impl Into<Pattern>) -> Self {
        Effect::Take(TakeFrom::Default(pattern.into()))
    }

    /// Takes the next message matching `pattern` from `chan`.
    pub fn take_events(chan: &EventChannel, pattern: impl Into<Pattern>) -> Self {
        Effect::Take(TakeFrom::Events(chan.clone(), pattern.into()))
    }

    /// Takes the next message from a FIFO channel.
    pub fn take_from(chan: &Channel) -> Self {
        Effect::Take(TakeFrom::Channel(chan.clone()))
    }

    /// Dispatches `message` to the runtime's dispatch sink.
    pub fn put(message: impl Into<Value>) -> Self {
        Effect::Put {
            to: PutTo::Dispatch,
            message: message.into(),
            wait: false,
        }
    }

    /// Puts `message` on `chan` without waiting for a taker.
    pub fn put_to(chan: &Channel, message: impl Into<Value>) -> Self {
        Effect::Put {
            to: PutTo::Channel(chan.clone()),
            message: message.into(),
            wait: false,
        }
    }

    /// Puts `message` on `chan` and waits until it is consumed (`true`) or rejected (`false`).
    pub fn put_and_wait(chan: &Channel, message: impl Into<Value>) -> Self {
        Effect::Put {
            to: PutTo::Channel(chan.clone()),
            message: message.into(),
            wait: true,
        }
    }

    pub fn call(saga: &SagaRef, args: Vec<Value>) -> Self {
        Effect::Call {
            saga: Arc::clone(saga),
            args,
        }
    }

    pub fn fork(saga: &SagaRef, args: Vec<Value>) -> Self {
        Effect::Fork {
            saga: Arc::clone(saga),
            args,
        }
    }

    pub fn join(task: &TaskHandle) -> Self {
        Effect::Join(task.clone())
    }

    pub fn cancel(task: &TaskHandle) -> Self {
        Effect::Cancel(Some(task.clone()))
    }

    pub fn cancel_self() -> Self {
        Effect::Cancel(None)
    }

    pub fn race(effects: impl Into<Effects>) -> Self {
        Effect::Race(effects.into())
    }

    pub fn all(effects: impl Into<Effects>) -> Self {
        Effect::All(effects.into())
    }

    /// Applies `selector` to the runtime's current state.
    pub fn select<F>(selector: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Effect::Select(Arc::new(selector))
    }

    pub fn cancelled() -> Self {
        Effect::Cancelled
    }

    /// Suspends for `d`. Race it against another effect to build a timeout.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use sagavisor::{Effect, Effects};
    ///
    /// let timed = Effect::race(Effects::keyed([
    ///     ("msg", Effect::take("PING")),
    ///     ("timeout", Effect::delay(Duration::from_secs(1))),
    /// ]));
    /// assert_eq!(timed.label(), "race");
    /// ```
    pub fn delay(d: Duration) -> Self {
        let timer = SagaFn::arc("delay", move |_cx, _args| async move {
            tokio::time::sleep(d).await;
            Ok(Value::Unit)
        });
        Effect::Call {
            saga: timer,
            args: Vec::new(),
        }
    }

    /// Stable lowercase name, used in monitor events.
    pub fn label(&self) -> &'static str {
        match self {
            Effect::Take(_) => "take",
            Effect::Put { .. } => "put",
            Effect::Call { .. } => "call",
            Effect::Fork { .. } => "fork",
            Effect::Join(_) => "join",
            Effect::Cancel(_) => "cancel",
            Effect::Race(_) => "race",
            Effect::All(_) => "all",
            Effect::Select(_) => "select",
            Effect::Cancelled => "cancelled",
        }
    }
}

impl fmt::Debug for TakeFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TakeFrom::Default(p) => f.debug_tuple("Default").field(p).finish(),
            TakeFrom::Events(_, p) => f.debug_tuple("Events").field(p).finish(),
            TakeFrom::Channel(c) => f.debug_tuple("Channel").field(c).finish(),
        }
    }
}

impl fmt::Debug for Effects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effects::List(v) => f.debug_list().entries(v).finish(),
            Effects::Keyed(v) => f
                .debug_map()
                .entries(v.iter().map(|(k, e)| (k, e)))
                .finish(),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Take(from) => f.debug_tuple("Take").field(from).finish(),
            Effect::Put { to, message, wait } => f
                .debug_struct("Put")
                .field("to", to)
                .field("message", message)
                .field("wait", wait)
                .finish(),
            Effect::Call { saga, args } => f
                .debug_struct("Call")
                .field("saga", &saga.name())
                .field("args", args)
                .finish(),
            Effect::Fork { saga, args } => f
                .debug_struct("Fork")
                .field("saga", &saga.name())
                .field("args", args)
                .finish(),
            Effect::Join(t) => f.debug_tuple("Join").field(&t.id()).finish(),
            Effect::Cancel(t) => f
                .debug_tuple("Cancel")
                .field(&t.as_ref().map(TaskHandle::id))
                .finish(),
            Effect::Race(e) => f.debug_tuple("Race").field(e).finish(),
            Effect::All(e) => f.debug_tuple("All").field(e).finish(),
            Effect::Select(_) => f.write_str("Select(..)"),
            Effect::Cancelled => f.write_str("Cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_are_inert() {
        let chan = Channel::new();
        let _ = Effect::put_to(&chan, 1);
        let _ = Effect::take_from(&chan);
        assert_eq!(chan.pending_puts(), 0);
        assert_eq!(chan.pending_takers(), 0);
    }

    #[test]
    fn keyed_set_keeps_insertion_order() {
        let set = Effects::keyed([
            ("z", Effect::cancelled()),
            ("a", Effect::take("A")),
        ]);
        let (keys, effects) = set.split();
        let keys = keys.unwrap();
        let names: Vec<&str> = keys.iter().map(|k| &**k).collect();
        assert_eq!(names, vec!["z", "a"]);
        assert_eq!(effects[0].label(), "cancelled");
        assert_eq!(effects[1].label(), "take");
    }

    #[test]
    fn delay_is_a_call() {
        let e = Effect::delay(Duration::from_millis(5));
        assert_eq!(e.label(), "call");
        match e {
            Effect::Call { saga, args } => {
                assert_eq!(saga.name(), "delay");
                assert!(args.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn put_defaults_to_fire_and_forget() {
        match Effect::put("X") {
            Effect::Put { to, wait, .. } => {
                assert!(matches!(to, PutTo::Dispatch));
                assert!(!wait);
            }
            other => panic!("unexpected {other:?}"),
        }
        let chan = Channel::new();
        assert!(matches!(
            Effect::put_and_wait(&chan, 1),
            Effect::Put { wait: true, .. }
        ));
    }
}
