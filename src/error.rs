//! Error type used by the sagavisor runtime, its channels and user sagas.
//!
//! A single enum, [`SagaError`], covers the four failure classes a saga can observe:
//!
//! - [`SagaError::Fail`]: a routine gave up (the usual "throw").
//! - [`SagaError::Upstream`]: an external event source produced an error value.
//! - [`SagaError::Misuse`]: the runtime was driven incorrectly (fails fast, never swallowed).
//! - [`SagaError::Cancelled`]: the task was cancelled; not a failure, see below.
//!
//! Cancellation travels through the same `Result` so that `?` unwinds a routine
//! cleanly, but the runtime never reports it as a failure: a task that ends with
//! `Cancelled` settles with [`Outcome::Cancelled`](crate::Outcome::Cancelled).
//!
//! The type is `Clone` because one settlement may reach several joiners.

use std::sync::Arc;
use thiserror::Error;

/// # Errors produced by sagas and the runtime that drives them.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SagaError {
    /// Routine failed; escalates to the parent task unless handled locally.
    #[error("saga failed: {error}")]
    Fail {
        /// The underlying error message.
        error: Arc<str>,
    },

    /// An external source delivered an error instead of a message.
    #[error("upstream source failed: {error}")]
    Upstream {
        /// The error reported by the source.
        error: Arc<str>,
    },

    /// Programmer misuse of the runtime (e.g. yielding two effects at once).
    #[error("runtime misuse: {reason}")]
    Misuse {
        /// What was done wrong.
        reason: Arc<str>,
    },

    /// The task was cancelled.
    #[error("task cancelled")]
    Cancelled,
}

impl SagaError {
    /// Shorthand for [`SagaError::Fail`].
    ///
    /// # Example
    /// ```
    /// use sagavisor::SagaError;
    ///
    /// let err = SagaError::fail("boom");
    /// assert_eq!(err.to_string(), "saga failed: boom");
    /// ```
    pub fn fail(error: impl Into<Arc<str>>) -> Self {
        SagaError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`SagaError::Upstream`].
    pub fn upstream(error: impl Into<Arc<str>>) -> Self {
        SagaError::Upstream {
            error: error.into(),
        }
    }

    /// Shorthand for [`SagaError::Misuse`].
    pub fn misuse(reason: impl Into<Arc<str>>) -> Self {
        SagaError::Misuse {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use sagavisor::SagaError;
    ///
    /// assert_eq!(SagaError::Cancelled.as_label(), "saga_cancelled");
    /// assert_eq!(SagaError::misuse("x").as_label(), "saga_misuse");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SagaError::Fail { .. } => "saga_failed",
            SagaError::Upstream { .. } => "saga_upstream",
            SagaError::Misuse { .. } => "saga_misuse",
            SagaError::Cancelled => "saga_cancelled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SagaError::Fail { error } => format!("error: {error}"),
            SagaError::Upstream { error } => format!("upstream: {error}"),
            SagaError::Misuse { reason } => format!("misuse: {reason}"),
            SagaError::Cancelled => "cancelled".to_string(),
        }
    }

    /// Indicates whether this is the cancellation signal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SagaError::Cancelled)
    }
}
