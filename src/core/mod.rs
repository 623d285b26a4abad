//! Runtime core: task tree, scheduling and lifecycle.
//!
//! The public API from this module is [`Runtime`] (with its [`RuntimeBuilder`]
//! and [`Config`]), [`run_saga`], and the task-facing types [`TaskHandle`],
//! [`TaskId`], [`TaskState`] and [`Outcome`].
//!
//! Internal modules:
//! - [`process`]: the driver; interprets effects and owns the task tree;
//! - [`mailbox`]: signals that reach the driver from outside its loop;
//! - [`handle`]: shared outside view of a task;
//! - [`runtime`]: entry point, starts one driver per root task.

mod builder;
mod config;
mod handle;
mod mailbox;
mod process;
mod runtime;

#[cfg(test)]
mod tests;

pub use builder::RuntimeBuilder;
pub use config::Config;
pub use handle::{Outcome, TaskHandle, TaskId, TaskState};
pub use runtime::{run_saga, Dispatch, GetState, Io, Runtime};
