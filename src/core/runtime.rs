//! # Runtime: entry point that starts root tasks.
//!
//! A [`Runtime`] owns the monitor [`Bus`], the [`SubscriberSet`] fan-out, the
//! configuration and the [`Io`] collaborators. Every [`Runtime::run`] starts an
//! independent task tree:
//!
//! ```text
//! Runtime::run(saga, args)
//!   ├─► EventChannel::new(io.source)        default channel of this tree
//!   ├─► Driver::start(saga)                 root task (named cfg.name)
//!   ├─► tokio::spawn(driver.run())          drives until the root settles
//!   └─► TaskHandle                          done().await / cancel()
//!
//! Driver ── publish(Event) ──► Bus ──► subscriber listener ──► SubscriberSet
//! ```
//!
//! `Take` effects without an explicit channel read the default channel;
//! `Put` effects without one go through `io.dispatch`; `Select` reads
//! `io.get_state`.
//!
//! ## Example
//! ```rust
//! use sagavisor::{run_saga, Emitter, Io, Outcome, SagaFn, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let actions = Emitter::<Value>::new();
//!     let io = Io::new(actions.clone()).with_state(|| Value::from(41));
//!
//!     let task = run_saga(io, SagaFn::arc("answer", |cx, _args| async move {
//!         let n = cx.select(|state| state.clone()).await?;
//!         Ok(Value::from(n.as_int().unwrap_or(0) + 1))
//!     }));
//!
//!     assert_eq!(task.done().await, Outcome::Done(Value::from(42)));
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use super::builder::RuntimeBuilder;
use super::config::Config;
use super::handle::TaskHandle;
use super::process::Driver;
use crate::channels::{Emitter, Source};
use crate::events::Bus;
use crate::sagas::SagaRef;
use crate::subscribers::SubscriberSet;
use crate::value::Value;

/// Sink for `Put` effects without an explicit channel.
pub type Dispatch = Arc<dyn Fn(Value) + Send + Sync>;

/// Accessor of the external state read by `Select` effects.
pub type GetState = Arc<dyn Fn() -> Value + Send + Sync>;

/// Collaborators a runtime talks to.
#[derive(Clone)]
pub struct Io {
    /// Feeds the default channel.
    pub source: Arc<dyn Source>,
    pub dispatch: Dispatch,
    pub get_state: GetState,
}

impl Io {
    /// Io over `source`; dispatch drops messages and state is `Unit`.
    pub fn new<S: Source + 'static>(source: S) -> Self {
        Self {
            source: Arc::new(source),
            dispatch: Arc::new(|_| {}),
            get_state: Arc::new(|| Value::Unit),
        }
    }

    pub fn with_dispatch<F>(mut self, dispatch: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.dispatch = Arc::new(dispatch);
        self
    }

    pub fn with_state<F>(mut self, get_state: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.get_state = Arc::new(get_state);
        self
    }
}

impl Default for Io {
    /// A source that never emits.
    fn default() -> Self {
        Io::new(Emitter::<Value>::new())
    }
}

impl fmt::Debug for Io {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Io").finish_non_exhaustive()
    }
}

/// Starts and observes saga task trees.
pub struct Runtime {
    cfg: Config,
    io: Io,
    bus: Bus,
    subs: Arc<SubscriberSet>,
}

impl Runtime {
    /// Returns a builder; see [`RuntimeBuilder`].
    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    pub(crate) fn new_internal(cfg: Config, io: Io, bus: Bus, subs: Arc<SubscriberSet>) -> Self {
        let rt = Self { cfg, io, bus, subs };
        rt.subscriber_listener();
        rt
    }

    /// Starts `saga` as the root of a new task tree.
    ///
    /// Must be called inside a tokio runtime.
    pub fn run(&self, saga: SagaRef, args: Vec<Value>) -> TaskHandle {
        let mut driver = Driver::new(self.cfg.clone(), self.io.clone(), self.bus.clone());
        let handle = driver.start(&saga, args);
        tokio::spawn(driver.run());
        handle
    }

    /// Monitor bus; subscribe to observe task and effect events.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Forwards bus events to the subscriber set (fire-and-forget).
    fn subscriber_listener(&self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime").field("cfg", &self.cfg).finish_non_exhaustive()
    }
}

/// Runs `saga` against `io` with the default configuration.
///
/// Must be called inside a tokio runtime.
pub fn run_saga(io: Io, saga: SagaRef) -> TaskHandle {
    Runtime::builder(Config::default())
        .with_io(io)
        .build()
        .run(saga, Vec::new())
}
