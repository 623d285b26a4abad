//! # sagavisor
//!
//! **Sagavisor** is a coroutine-driven effect runtime for Rust.
//!
//! Application logic is written as *sagas*: `async` routines that never touch
//! the outside world directly. Instead they yield declarative [`Effect`]s
//! (take a message, put one, call or fork a child routine, race, join,
//! cancel, ...) through their [`Cx`], and the runtime interprets them. Every
//! routine runs as a task in a tree; cancelling a task cancels its whole
//! subtree, and failures of forked children escalate to their parents.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   external source ──► EventChannel (default channel) ◄── Take(pattern)
//!   dispatch sink   ◄── Put(message)                    │
//!   get_state       ◄── Select(selector)                │
//!                                                       │
//! ┌─────────────────────────────────────────────────────┴─────────────┐
//! │  Driver (one per root task, owns the task tree)                   │
//! │  - polls routines; takes the effect each one yields               │
//! │  - interprets effects; resumes routines with their results        │
//! │  - mailbox: channel deliveries, wakers, TaskHandle::cancel        │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     root task ──fork──► child ──call──► grandchild     (task tree)
//!        │
//!        │ publishes TaskStarted / EffectTriggered / TaskDone / ...
//!        ▼
//!   Bus (broadcast) ──► subscriber listener ──► SubscriberSet ──► Subscribe impls
//! ```
//!
//! ### Task lifecycle
//! ```text
//! spawn ──► Running ⇄ Suspended ──► Done(value)      (body returned, forks settled)
//!                              ├──► Errored(error)  (body failed or a fork failed)
//!                              └──► Cancelled       (cancel: subtree first, then cleanup)
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                          |
//! |-------------------|-----------------------------------------------------------------|---------------------------------------------|
//! | **Channels**      | FIFO channel, take-by-pattern channels over external sources.   | [`Channel`], [`EventChannel`], [`Pattern`]  |
//! | **Effects**       | Declarative descriptions of asynchronous actions.               | [`Effect`], [`Effects`]                     |
//! | **Sagas**         | Routines as closures or trait impls.                            | [`Saga`], [`SagaFn`], [`SagaRef`], [`Cx`]   |
//! | **Runtime**       | Task tree, cancellation, error escalation.                      | [`Runtime`], [`TaskHandle`], [`Outcome`]    |
//! | **Subscriber API**| Hook into task and effect events.                               | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | One error type for routines, sources and misuse.                | [`SagaError`]                               |
//! | **Configuration** | Centralize runtime settings.                                    | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use sagavisor::{Config, Emitter, Message, Outcome, Runtime, SagaFn, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let actions = Emitter::<Value>::new();
//!     let dispatched = Arc::new(Mutex::new(Vec::new()));
//!     let sink = dispatched.clone();
//!
//!     let rt = Runtime::builder(Config::default())
//!         .with_source(actions.clone())
//!         .with_dispatch(move |v| sink.lock().unwrap().push(v))
//!         .build();
//!
//!     let echo = SagaFn::arc("echo", |cx, _args| async move {
//!         loop {
//!             let msg = cx.take("PING").await?;
//!             if msg.is_end() {
//!                 return Ok(Value::Unit);
//!             }
//!             cx.put(Message::new("PONG")).await?;
//!         }
//!     });
//!     let task = rt.run(echo, Vec::new());
//!
//!     tokio::task::yield_now().await;
//!     actions.emit(&Message::new("PING").into());
//!     tokio::task::yield_now().await;
//!     actions.emit(&Value::End);
//!
//!     assert_eq!(task.done().await, Outcome::Done(Value::Unit));
//!     assert_eq!(*dispatched.lock().unwrap(), vec![Value::from(Message::new("PONG"))]);
//! }
//! ```
mod channels;
mod core;
mod effects;
mod error;
mod events;
mod helpers;
mod sagas;
mod subscribers;
mod util;
mod value;

// ---- Public re-exports ----

pub use channels::{
    source_fn, Channel, Emitter, EventChannel, FnSource, Listener, Matcher, Pattern,
    PatternChannel, PutAck, Source, TakeTicket, Taker, Unsubscribe,
};
pub use crate::core::{
    run_saga, Config, Dispatch, GetState, Io, Outcome, Runtime, RuntimeBuilder, TaskHandle,
    TaskId, TaskState,
};
pub use effects::{Effect, Effects, PutTo, Selector, TakeFrom};
pub use error::SagaError;
pub use events::{Bus, Event, EventKind};
pub use helpers::{take_every, take_latest};
pub use sagas::{BoxSagaFuture, Cx, EffectFuture, Saga, SagaFn, SagaRef};
pub use subscribers::{Subscribe, SubscriberSet};
pub use value::{Message, Value};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
