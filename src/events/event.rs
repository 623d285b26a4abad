//! # Monitor events emitted by the runtime.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Task events**: a task started, or settled (done, cancelled, failed)
//! - **Effect events**: an effect was triggered, then resolved, rejected or cancelled
//! - **Subscriber events**: the fan-out dropped an event or a subscriber panicked
//!
//! The [`Event`] struct carries additional metadata such as timestamps, task
//! id/name, parent id, effect id/label and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use sagavisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_task("watcher")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task.as_deref(), Some("watcher"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::core::TaskId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Task events ===
    /// A task was created and is about to be polled for the first time.
    ///
    /// Sets:
    /// - `task`, `task_id`: task name and id
    /// - `parent_id`: parent task (absent for the root)
    /// - `effect`: `"call"` / `"fork"` / `"root"`
    TaskStarted,

    /// Task settled with a value (its body returned and every fork settled).
    ///
    /// Sets: `task`, `task_id`
    TaskDone,

    /// Task was cancelled (explicitly, by an ancestor, or by itself).
    ///
    /// Sets: `task`, `task_id`
    TaskCancelled,

    /// Task settled with an error.
    ///
    /// Sets: `task`, `task_id`, `reason`
    TaskFailed,

    // === Effect events ===
    /// A task yielded an effect (or a combinator started a branch).
    ///
    /// Sets:
    /// - `task_id`: owning task
    /// - `effect_id`, `effect`: effect id and label
    /// - `parent_effect`: enclosing race/all, for branches
    EffectTriggered,

    /// Effect settled with a value.
    ///
    /// Sets: `task_id`, `effect_id`, `effect`
    EffectResolved,

    /// Effect settled with an error.
    ///
    /// Sets: `task_id`, `effect_id`, `effect`, `reason`
    EffectRejected,

    /// Effect was withdrawn before settling (owner cancelled, race lost, ...).
    ///
    /// Sets: `task_id`, `effect_id`, `effect`
    EffectCancelled,

    /// The root task settled; the runtime loop is exiting.
    ///
    /// Sets: `task`, `task_id`, `reason` (outcome summary)
    RootSettled,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the task (or subscriber), if applicable.
    pub task: Option<Arc<str>>,
    pub task_id: Option<TaskId>,
    pub parent_id: Option<TaskId>,
    pub effect_id: Option<u64>,
    /// Enclosing `race`/`all` effect of a branch.
    pub parent_effect: Option<u64>,
    /// Effect label (see [`Effect::label`](crate::Effect::label)).
    pub effect: Option<&'static str>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            task_id: None,
            parent_id: None,
            effect_id: None,
            parent_effect: None,
            effect: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a task (or subscriber) name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    #[inline]
    pub fn with_task_id(mut self, id: TaskId) -> Self {
        self.task_id = Some(id);
        self
    }

    #[inline]
    pub fn with_parent(mut self, parent: Option<TaskId>) -> Self {
        self.parent_id = parent;
        self
    }

    /// Attaches an effect id and label.
    #[inline]
    pub fn with_effect(mut self, id: u64, label: &'static str) -> Self {
        self.effect_id = Some(id);
        self.effect = Some(label);
        self
    }

    #[inline]
    pub fn with_parent_effect(mut self, id: Option<u64>) -> Self {
        self.parent_effect = id;
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }

    /// `true` for the task-settlement kinds.
    #[inline]
    pub fn is_task_settled(&self) -> bool {
        matches!(
            self.kind,
            EventKind::TaskDone | EventKind::TaskCancelled | EventKind::TaskFailed
        )
    }
}
