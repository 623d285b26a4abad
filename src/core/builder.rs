use std::sync::Arc;

use super::config::Config;
use super::runtime::{Io, Runtime};
use crate::channels::Source;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::value::Value;

/// Builder for constructing a [`Runtime`] with optional collaborators.
pub struct RuntimeBuilder {
    cfg: Config,
    io: Io,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl RuntimeBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            io: Io::default(),
            subscribers: Vec::new(),
        }
    }

    /// Replaces all collaborators at once.
    pub fn with_io(mut self, io: Io) -> Self {
        self.io = io;
        self
    }

    /// Sets the source feeding the default channel.
    pub fn with_source<S: Source + 'static>(mut self, source: S) -> Self {
        self.io.source = Arc::new(source);
        self
    }

    /// Sets the sink of `Put` effects without an explicit channel.
    pub fn with_dispatch<F>(mut self, dispatch: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.io = self.io.with_dispatch(dispatch);
        self
    }

    /// Sets the state accessor read by `Select` effects.
    pub fn with_state<F>(mut self, get_state: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.io = self.io.with_state(get_state);
        self
    }

    /// Sets monitor subscribers.
    ///
    /// Subscribers receive task and effect events through dedicated workers
    /// with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the runtime: event bus, subscriber workers and listener.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Runtime {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        Runtime::new_internal(self.cfg, self.io, bus, subs)
    }
}
