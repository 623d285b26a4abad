//! # Function-backed saga (`SagaFn`)
//!
//! [`SagaFn`] wraps a closure `F: Fn(Cx, Vec<Value>) -> Fut`, producing a fresh
//! future per spawn. Nothing is shared between spawns unless the closure
//! captures an `Arc<...>` explicitly.
//!
//! ## Example
//! ```rust
//! use sagavisor::{SagaFn, SagaRef, Value};
//!
//! let s: SagaRef = SagaFn::arc("watcher", |cx, _args| async move {
//!     let msg = cx.take("PING").await?;
//!     cx.put(msg).await?;
//!     Ok(Value::Unit)
//! });
//! assert_eq!(s.name(), "watcher");
//! ```

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::SagaError;
use crate::sagas::cx::Cx;
use crate::sagas::saga::{BoxSagaFuture, Saga, SagaRef};
use crate::value::Value;

/// Function-backed saga implementation.
pub struct SagaFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F, Fut> SagaFn<F>
where
    F: Fn(Cx, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, SagaError>> + Send + 'static,
{
    /// Creates a new function-backed saga.
    ///
    /// Prefer [`SagaFn::arc`] when you immediately need a [`SagaRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the saga and returns it as a shared handle (`Arc<dyn Saga>`).
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> SagaRef {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> Saga for SagaFn<F>
where
    F: Fn(Cx, Vec<Value>) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<Value, SagaError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, cx: Cx, args: Vec<Value>) -> BoxSagaFuture {
        Box::pin((self.f)(cx, args))
    }
}

impl<F> fmt::Debug for SagaFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SagaFn").field("name", &self.name).finish()
    }
}
