//! # Watcher sagas built from effects.
//!
//! - [`take_every`] forks a worker for every matching message.
//! - [`take_latest`] does the same but cancels the previous worker if it is
//!   still running, so at most one worker is live.
//!
//! Both return when the default channel delivers End; the runtime then waits
//! for workers that are still running.
//!
//! ```rust
//! use sagavisor::{take_every, SagaFn, SagaRef, Value};
//!
//! let on_click: SagaRef = SagaFn::arc("on-click", |cx, args| async move {
//!     cx.put(args.into_iter().next().unwrap_or_default()).await?;
//!     Ok(Value::Unit)
//! });
//! let watcher = take_every("CLICK", on_click);
//! assert_eq!(watcher.name(), "take_every");
//! ```

use crate::channels::Pattern;
use crate::core::TaskHandle;
use crate::sagas::{SagaFn, SagaRef};
use crate::value::Value;

/// Forks `worker` with each message matching `pattern` as its only argument.
pub fn take_every(pattern: impl Into<Pattern>, worker: SagaRef) -> SagaRef {
    let pattern = pattern.into();
    SagaFn::arc("take_every", move |cx, _args| {
        let pattern = pattern.clone();
        let worker = worker.clone();
        async move {
            loop {
                let message = cx.take(pattern.clone()).await?;
                if message.is_end() {
                    return Ok(Value::Unit);
                }
                cx.fork(&worker, vec![message]).await?;
            }
        }
    })
}

/// Like [`take_every`], cancelling the previous worker if still running.
pub fn take_latest(pattern: impl Into<Pattern>, worker: SagaRef) -> SagaRef {
    let pattern = pattern.into();
    SagaFn::arc("take_latest", move |cx, _args| {
        let pattern = pattern.clone();
        let worker = worker.clone();
        async move {
            let mut last: Option<TaskHandle> = None;
            loop {
                let message = cx.take(pattern.clone()).await?;
                if message.is_end() {
                    return Ok(Value::Unit);
                }
                if let Some(previous) = last.take() {
                    if previous.is_running() {
                        cx.cancel(&previous).await?;
                    }
                }
                last = Some(cx.fork(&worker, vec![message]).await?);
            }
        }
    })
}
