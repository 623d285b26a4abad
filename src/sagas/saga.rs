//! # Saga abstraction.
//!
//! A saga is a cooperative routine: an `async` computation that interacts with
//! the outside world only by yielding [`Effect`](crate::Effect)s through its
//! [`Cx`]. The runtime creates a fresh future per spawn via [`Saga::spawn`] and
//! is the only party that ever polls it.
//!
//! The common handle type is [`SagaRef`], an `Arc<dyn Saga>` suitable for
//! embedding in effects and spawning any number of times.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::SagaError;
use crate::sagas::cx::Cx;
use crate::value::Value;

/// Boxed future returned by [`Saga::spawn`].
pub type BoxSagaFuture = BoxFuture<'static, Result<Value, SagaError>>;

/// Shared handle to a saga.
pub type SagaRef = Arc<dyn Saga>;

/// # Cooperative routine driven by the runtime.
///
/// # Example
/// ```
/// use futures::future::FutureExt;
/// use sagavisor::{BoxSagaFuture, Cx, Saga, Value};
///
/// struct Ping;
///
/// impl Saga for Ping {
///     fn name(&self) -> &str { "ping" }
///
///     fn spawn(&self, cx: Cx, _args: Vec<Value>) -> BoxSagaFuture {
///         async move {
///             cx.put(Value::from("PING")).await?;
///             Ok(Value::Unit)
///         }
///         .boxed()
///     }
/// }
/// ```
pub trait Saga: Send + Sync + 'static {
    /// Returns a stable, human-readable saga name (used as the task name).
    fn name(&self) -> &str;

    /// Creates a new routine instance bound to `cx`, called with `args`.
    fn spawn(&self, cx: Cx, args: Vec<Value>) -> BoxSagaFuture;
}
