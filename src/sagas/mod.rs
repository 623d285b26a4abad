//! Sagas: the routines the runtime drives.
//!
//! - [`Saga`] trait and [`SagaRef`] shared handle
//! - [`SagaFn`] closure-backed saga
//! - [`Cx`] explicit per-task context; [`Cx::run`] is the yield point

mod cx;
mod saga;
mod saga_fn;

pub(crate) use cx::SharedSlot;
pub use cx::{Cx, EffectFuture};
pub use saga::{BoxSagaFuture, Saga, SagaRef};
pub use saga_fn::SagaFn;
