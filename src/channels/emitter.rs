//! # Minimal synchronous broadcaster.
//!
//! [`Emitter`] keeps a list of listeners; [`Emitter::emit`] calls each listener
//! registered at the time of the call, in subscription order. Listeners added or
//! removed during an emit take effect from the next emit on.
//!
//! An `Emitter<Value>` is a ready-made [`Source`](crate::Source) for
//! [`EventChannel`](crate::EventChannel) and for the runtime's default channel.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use sagavisor::Emitter;
//!
//! let em = Emitter::<i32>::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let unsub = em.subscribe(move |n: &i32| sink.lock().unwrap().push(*n));
//!
//! em.emit(&1);
//! unsub.unsubscribe();
//! em.emit(&2);
//! assert_eq!(*seen.lock().unwrap(), vec![1]);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::util::lock;

type EmitterListener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Detaches a listener from its source.
///
/// Dropping it without calling [`unsubscribe`](Unsubscribe::unsubscribe) keeps
/// the listener attached.
#[must_use = "dropping an Unsubscribe keeps the listener attached"]
pub struct Unsubscribe(Option<Box<dyn FnOnce() + Send>>);

impl Unsubscribe {
    /// Wraps a detach function.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Some(Box::new(f)))
    }

    /// An unsubscribe that does nothing (for sources that never need detaching).
    pub fn noop() -> Self {
        Self(None)
    }

    /// Detaches the listener.
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("armed", &self.0.is_some())
            .finish()
    }
}

struct Listeners<T> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, EmitterListener<T>)>>,
}

/// Publish/subscribe broadcaster. Cheap to clone; clones share listeners.
pub struct Emitter<T> {
    inner: Arc<Listeners<T>>,
}

impl<T: 'static> Emitter<T> {
    /// Creates an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Listeners {
                next_id: AtomicU64::new(0),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registers `listener`; returns the handle that removes it again.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.entries).push((id, Arc::new(listener)));

        let weak = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner.entries).retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Delivers `item` to a snapshot of the current listeners.
    pub fn emit(&self, item: &T) {
        let snapshot: Vec<EmitterListener<T>> = lock(&self.inner.entries)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(item);
        }
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.entries).len()
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &lock(&self.inner.entries).len())
            .finish()
    }
}
