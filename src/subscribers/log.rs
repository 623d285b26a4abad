//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints monitor events to stdout in a human-readable format.
//!
//! ## Output format
//! ```text
//! [task-started] task=root#1
//! [effect] task=#1 effect=take#3
//! [effect-resolved] task=#1 effect=take#3
//! [task-cancelled] task=counter#2
//! [task-failed] task=worker#4 err="saga failed: boom"
//! [root-settled] task=root#1 outcome=done
//! ```
//!
//! ## Example
//! ```no_run
//! # use std::sync::Arc;
//! # use sagavisor::{Config, LogWriter, Runtime};
//! # async fn demo() {
//! let rt = Runtime::builder(Config::default())
//!     .with_subscribers(vec![Arc::new(LogWriter::new())])
//!     .build();
//! # }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Effect-level events are printed only when
/// created with [`LogWriter::verbose`].
#[derive(Debug, Default)]
pub struct LogWriter {
    effects: bool,
}

impl LogWriter {
    /// Logs task-level events only.
    pub fn new() -> Self {
        Self { effects: false }
    }

    /// Logs task-level and effect-level events.
    pub fn verbose() -> Self {
        Self { effects: true }
    }
}

fn task(e: &Event) -> String {
    let name = e.task.as_deref().unwrap_or("");
    match e.task_id {
        Some(id) => format!("{name}{id}"),
        None => name.to_string(),
    }
}

fn effect(e: &Event) -> String {
    format!("{}#{}", e.effect.unwrap_or("?"), e.effect_id.unwrap_or_default())
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::TaskStarted => println!("[task-started] task={}", task(e)),
            EventKind::TaskDone => println!("[task-done] task={}", task(e)),
            EventKind::TaskCancelled => println!("[task-cancelled] task={}", task(e)),
            EventKind::TaskFailed => {
                println!("[task-failed] task={} err={:?}", task(e), e.reason.as_deref());
            }
            EventKind::RootSettled => println!(
                "[root-settled] task={} outcome={}",
                task(e),
                e.reason.as_deref().unwrap_or("")
            ),
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                println!("[subscriber] {:?}", e.reason.as_deref());
            }
            EventKind::EffectTriggered if self.effects => {
                println!("[effect] task={} effect={}", task(e), effect(e));
            }
            EventKind::EffectResolved if self.effects => {
                println!("[effect-resolved] task={} effect={}", task(e), effect(e));
            }
            EventKind::EffectRejected if self.effects => println!(
                "[effect-rejected] task={} effect={} err={:?}",
                task(e),
                effect(e),
                e.reason.as_deref()
            ),
            EventKind::EffectCancelled if self.effects => {
                println!("[effect-cancelled] task={} effect={}", task(e), effect(e));
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
