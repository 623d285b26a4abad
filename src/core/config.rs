//! # Global runtime configuration.
//!
//! Provides [`Config`], centralized settings for a [`Runtime`](crate::Runtime).
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → clamped to 1
//! - `sync_budget = 0` → clamped to 1 (yield after every synchronous step)

use std::borrow::Cow;

/// Global configuration for the saga runtime.
///
/// ## Field semantics
/// - `name`: task name given to every root task started by [`Runtime::run`](crate::Runtime::run)
/// - `bus_capacity`: monitor bus ring buffer size (min 1)
/// - `sync_budget`: consecutive synchronous steps before the driver yields to tokio
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Name of root tasks (appears in monitor events).
    pub name: Cow<'static, str>,

    /// Capacity of the monitor bus broadcast ring buffer.
    ///
    /// Slow receivers that lag behind more than `bus_capacity` events observe
    /// `Lagged` and skip older items.
    pub bus_capacity: usize,

    /// Number of effects the driver interprets back to back before yielding.
    ///
    /// A routine that only puts or selects never suspends; the budget keeps
    /// such a routine from monopolizing its tokio worker.
    pub sync_budget: usize,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the synchronous step budget clamped to a minimum of 1.
    #[inline]
    pub fn sync_budget_clamped(&self) -> usize {
        self.sync_budget.max(1)
    }

    /// Sets the root task name.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `name = "root"`
    /// - `bus_capacity = 1024` (good baseline)
    /// - `sync_budget = 1024`
    fn default() -> Self {
        Self {
            name: Cow::Borrowed("root"),
            bus_capacity: 1024,
            sync_budget: 1024,
        }
    }
}
