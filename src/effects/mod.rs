//! Effects: what routines yield.
//!
//! - [`Effect`] the closed set of effect kinds
//! - [`Effects`] list / keyed sets for `race` and `all`
//! - [`TakeFrom`], [`PutTo`] targets of take and put
//! - [`Selector`] state reader for `select`

mod effect;

pub use effect::{Effect, Effects, PutTo, Selector, TakeFrom};
